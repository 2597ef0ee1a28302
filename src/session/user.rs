/// One simulated user issuing streaming chat requests.
use super::config::{Pacing, StopCondition};
use super::outcome::{Outcome, OutcomeStatus};
use crate::error::AppError;
use crate::http::client::{ChatClient, ChatRequest};
use crate::prompts::{tag_prompt, PromptCatalog};
use crate::shutdown::ShutdownListener;
use crate::stats::{FailureCategory, StatsAggregator};
use crate::stream::StreamDecoder;
use crate::transcript::{SessionSummary, Transcript};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Identity and request parameters of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Globally unique user id.
    pub user_id: u64,
    /// 0 outside distributed runs.
    pub node_id: u32,
    pub stop: StopCondition,
    pub pacing: Pacing,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// What a finished session reports back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub user_id: u64,
    pub attempts: u64,
    pub failures: u64,
    pub summary: SessionSummary,
}

#[derive(Debug, Default)]
struct Tally {
    attempts: u64,
    completed: u64,
    failed: u64,
    total_response_time: Duration,
    total_tokens: u64,
}

/// Drives one simulated user until its stopping condition is met.
///
/// Attempts are strictly sequential. Every outcome goes to the shared
/// aggregator and to this session's own transcript; no error escapes
/// [`run`](Self::run).
pub struct UserSession<C: ?Sized, W: Write> {
    config: SessionConfig,
    client: Arc<C>,
    stats: Arc<StatsAggregator>,
    prompts: Arc<PromptCatalog>,
    transcript: Transcript<W>,
    rng: fastrand::Rng,
    shutdown: ShutdownListener,
}

impl<C, W> UserSession<C, W>
where
    C: ChatClient + ?Sized,
    W: Write,
{
    pub fn new(
        config: SessionConfig,
        client: Arc<C>,
        stats: Arc<StatsAggregator>,
        prompts: Arc<PromptCatalog>,
        transcript: Transcript<W>,
    ) -> Self {
        Self {
            config,
            client,
            stats,
            prompts,
            transcript,
            rng: fastrand::Rng::new(),
            shutdown: ShutdownListener::never(),
        }
    }

    /// Use a specific random source for prompt choice and pauses.
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownListener) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run the session to completion and write its summary record.
    pub async fn run(mut self) -> SessionReport {
        let _active = self.stats.enter_session();
        let started = Instant::now();
        let mut tally = Tally::default();
        let (node, user) = (self.config.node_id, self.config.user_id);

        info!(node, user, "session started");

        while !self.should_stop(started, &tally) {
            let prompt = self.prompts.choose(&mut self.rng).to_string();
            let outcome = self.attempt(&prompt).await;
            tally.attempts += 1;
            self.record(&outcome, &mut tally);

            let pause = if matches!(
                outcome.status,
                OutcomeStatus::Timeout | OutcomeStatus::ConnectionError(_) | OutcomeStatus::Exception(_)
            ) {
                self.config.pacing.after_error(&mut self.rng)
            } else {
                self.config.pacing.regular(&mut self.rng)
            };
            self.pause(pause).await;
        }

        let summary = SessionSummary {
            total_messages: tally.completed,
            session_duration: started.elapsed(),
            avg_response_time: if tally.completed > 0 {
                tally
                    .total_response_time
                    .div_f64(tally.completed as f64)
            } else {
                Duration::ZERO
            },
            total_tokens: tally.total_tokens,
        };
        if let Err(e) = self.transcript.write_summary(&summary) {
            warn!(node, user, error = %e, "failed to write session summary");
        }

        info!(
            node,
            user,
            messages = tally.completed,
            failures = tally.failed,
            "session finished"
        );

        SessionReport {
            user_id: user,
            attempts: tally.attempts,
            failures: tally.failed,
            summary,
        }
    }

    fn should_stop(&self, started: Instant, tally: &Tally) -> bool {
        self.shutdown.is_triggered()
            || self
                .config
                .stop
                .is_met(started, tally.completed, tally.attempts)
    }

    /// Issue one request and drain its stream.
    async fn attempt(&self, prompt: &str) -> Outcome {
        let content = tag_prompt(self.config.node_id, self.config.user_id, prompt);
        let request = ChatRequest::user_turn(
            &self.config.model,
            &content,
            self.config.temperature,
            self.config.max_tokens,
        );

        self.stats.record_sent();
        let started = Instant::now();

        let response = match self.client.stream_chat(&request).await {
            Ok(response) => response,
            Err(e) => return transport_failure(prompt, e, started.elapsed()),
        };

        if !response.is_success() {
            return Outcome::http_error(prompt, response.status, started.elapsed());
        }

        match StreamDecoder::new(response.lines).drain().await {
            Ok(drained) => {
                let elapsed = started.elapsed();
                if drained.text.is_empty() {
                    Outcome::empty_response(prompt, elapsed)
                } else {
                    let ttft = drained
                        .first_fragment_at
                        .map(|at| at.saturating_duration_since(started));
                    Outcome::success(prompt, drained.text, elapsed, drained.token_count, ttft)
                }
            }
            Err(e) => transport_failure(prompt, AppError::from(e), started.elapsed()),
        }
    }

    fn record(&mut self, outcome: &Outcome, tally: &mut Tally) {
        let (node, user) = (self.config.node_id, self.config.user_id);

        let message_index = match outcome.failure_category() {
            None => {
                self.stats
                    .record_completed(outcome.elapsed, outcome.token_count);
                if let Some(ttft) = outcome.time_to_first_token {
                    self.stats.record_first_token(ttft);
                }
                tally.completed += 1;
                tally.total_response_time += outcome.elapsed;
                tally.total_tokens += outcome.token_count;

                info!(
                    node,
                    user,
                    message = tally.completed,
                    elapsed_s = outcome.elapsed.as_secs_f64(),
                    tokens = outcome.token_count,
                    tokens_per_s = outcome.tokens_per_second(),
                    "message completed"
                );
                tally.completed
            }
            Some(category) => {
                self.stats.record_failed(category);
                tally.failed += 1;
                log_failure(node, user, category, outcome);
                tally.completed + 1
            }
        };

        if let Err(e) = self.transcript.write_attempt(message_index, outcome) {
            warn!(node, user, error = %e, "failed to write transcript record");
        }
    }

    /// Sleep, cut short by shutdown.
    async fn pause(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let user = self.config.user_id;
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.triggered() => {
                debug!(user, "pause interrupted by shutdown");
            }
        }
    }
}

fn transport_failure(prompt: &str, err: AppError, elapsed: Duration) -> Outcome {
    let description = err.to_string();
    if err.is_timeout() {
        Outcome::timeout(prompt, &description, elapsed)
    } else if err.failure_category() == FailureCategory::Connection {
        Outcome::connection_error(prompt, &description, elapsed)
    } else {
        Outcome::exception(prompt, &description, elapsed)
    }
}

fn log_failure(node: u32, user: u64, category: FailureCategory, outcome: &Outcome) {
    match &outcome.status {
        OutcomeStatus::HttpError(status) => {
            warn!(node, user, status, %category, "HTTP error")
        }
        OutcomeStatus::EmptyResponse => warn!(node, user, %category, "empty response"),
        OutcomeStatus::Timeout => warn!(node, user, %category, "request timeout"),
        OutcomeStatus::ConnectionError(reason) | OutcomeStatus::Exception(reason) => {
            warn!(node, user, %category, error = %reason, "request failed")
        }
        OutcomeStatus::Success => {}
    }
}
