/// Error types for the chatload crate.
use thiserror::Error;

use crate::stats::FailureCategory;

/// Errors raised while reading a streamed response body.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Stream timed out")]
    Timeout,

    #[error("Stream line is not valid UTF-8")]
    InvalidUtf8,
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AppError {
    /// Failure bucket an attempt-level error is counted under.
    pub fn failure_category(&self) -> FailureCategory {
        match self {
            AppError::Http(_)
            | AppError::Api(_)
            | AppError::Timeout(_)
            | AppError::Stream(StreamError::Timeout)
            | AppError::Stream(StreamError::Transport(_)) => FailureCategory::Connection,
            _ => FailureCategory::General,
        }
    }

    /// Whether the error represents an exceeded request deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::Timeout(_) | AppError::Stream(StreamError::Timeout)
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::Http(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_count_as_connection_failures() {
        assert_eq!(
            AppError::Http("refused".into()).failure_category(),
            FailureCategory::Connection
        );
        assert_eq!(
            AppError::Timeout("60s".into()).failure_category(),
            FailureCategory::Connection
        );
        assert_eq!(
            AppError::Stream(StreamError::Transport("reset".into())).failure_category(),
            FailureCategory::Connection
        );
    }

    #[test]
    fn other_errors_count_as_general_failures() {
        let io = std::io::Error::other("disk full");
        assert_eq!(AppError::Io(io).failure_category(), FailureCategory::General);
        assert_eq!(
            AppError::Stream(StreamError::InvalidUtf8).failure_category(),
            FailureCategory::General
        );
        assert_eq!(
            AppError::Config("bad".into()).failure_category(),
            FailureCategory::General
        );
    }

    #[test]
    fn timeout_detection() {
        assert!(AppError::Timeout("deadline".into()).is_timeout());
        assert!(AppError::Stream(StreamError::Timeout).is_timeout());
        assert!(!AppError::Api("500".into()).is_timeout());
    }
}
