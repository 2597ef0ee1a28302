/// Result of a single attempt.
use crate::stats::FailureCategory;
use std::time::Duration;

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    /// Server answered with a non-success status code.
    HttpError(u16),
    /// Success status but no text was streamed.
    EmptyResponse,
    Timeout,
    /// Connection refused, reset, or otherwise broken transport.
    ConnectionError(String),
    /// Any other failure, with its description.
    Exception(String),
}

impl OutcomeStatus {
    /// Label written to the transcript.
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "SUCCESS",
            OutcomeStatus::HttpError(_) | OutcomeStatus::EmptyResponse => "FAILED",
            OutcomeStatus::Timeout
            | OutcomeStatus::ConnectionError(_)
            | OutcomeStatus::Exception(_) => "ERROR",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success)
    }
}

/// Everything known about one finished attempt.
///
/// Handed to the transcript and the aggregator, then dropped.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub elapsed: Duration,
    pub token_count: u64,
    pub time_to_first_token: Option<Duration>,
    /// Prompt as picked from the catalog, before any node tag.
    pub prompt: String,
    /// Accumulated response text, or a description of the failure.
    pub text: String,
}

impl Outcome {
    pub fn success(
        prompt: &str,
        text: String,
        elapsed: Duration,
        token_count: u64,
        time_to_first_token: Option<Duration>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Success,
            elapsed,
            token_count,
            time_to_first_token,
            prompt: prompt.to_string(),
            text,
        }
    }

    pub fn http_error(prompt: &str, status: u16, elapsed: Duration) -> Self {
        Self::failure(
            OutcomeStatus::HttpError(status),
            prompt,
            format!("ERROR: HTTP {}", status),
            elapsed,
        )
    }

    pub fn empty_response(prompt: &str, elapsed: Duration) -> Self {
        Self::failure(
            OutcomeStatus::EmptyResponse,
            prompt,
            "No response received".to_string(),
            elapsed,
        )
    }

    pub fn timeout(prompt: &str, description: &str, elapsed: Duration) -> Self {
        Self::failure(
            OutcomeStatus::Timeout,
            prompt,
            format!("Exception: {}", description),
            elapsed,
        )
    }

    pub fn connection_error(prompt: &str, description: &str, elapsed: Duration) -> Self {
        Self::failure(
            OutcomeStatus::ConnectionError(description.to_string()),
            prompt,
            format!("Exception: {}", description),
            elapsed,
        )
    }

    pub fn exception(prompt: &str, description: &str, elapsed: Duration) -> Self {
        Self::failure(
            OutcomeStatus::Exception(description.to_string()),
            prompt,
            format!("Exception: {}", description),
            elapsed,
        )
    }

    fn failure(status: OutcomeStatus, prompt: &str, text: String, elapsed: Duration) -> Self {
        Self {
            status,
            elapsed,
            token_count: 0,
            time_to_first_token: None,
            prompt: prompt.to_string(),
            text,
        }
    }

    /// Fragments per second of wall time, 0 for a zero-length attempt.
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.token_count as f64 / secs
        } else {
            0.0
        }
    }

    /// Failure bucket for the aggregator, `None` for a success.
    pub fn failure_category(&self) -> Option<FailureCategory> {
        match self.status {
            OutcomeStatus::Success => None,
            OutcomeStatus::HttpError(_)
            | OutcomeStatus::Timeout
            | OutcomeStatus::ConnectionError(_) => Some(FailureCategory::Connection),
            OutcomeStatus::EmptyResponse => Some(FailureCategory::Streaming),
            OutcomeStatus::Exception(_) => Some(FailureCategory::General),
        }
    }
}
