/// Types shared between the aggregator and its readers.
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Failure bucket passed to [`StatsAggregator::record_failed`](super::StatsAggregator::record_failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    /// Non-success status, timeout, unreachable endpoint.
    Connection,
    /// Success status but no usable text in the stream.
    Streaming,
    /// Anything else that went wrong during an attempt.
    General,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Connection => "connection",
            FailureCategory::Streaming => "streaming",
            FailureCategory::General => "general",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nearest-rank response time percentiles, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Percentiles {
    /// Compute percentiles from an ascending-sorted sample set.
    ///
    /// Uses `index = min(floor(rank * n), n - 1)` with no interpolation, so
    /// small sample sets are biased slightly high. Historical reports were
    /// produced with this rule and stay comparable only if it is kept.
    ///
    /// Returns `None` for an empty sample set.
    pub fn from_sorted(sorted: &[Duration]) -> Option<Self> {
        if sorted.is_empty() {
            return None;
        }

        Some(Self {
            p50: nearest_rank(sorted, 0.50),
            p90: nearest_rank(sorted, 0.90),
            p95: nearest_rank(sorted, 0.95),
            p99: nearest_rank(sorted, 0.99),
        })
    }
}

fn nearest_rank(sorted: &[Duration], rank: f64) -> f64 {
    let n = sorted.len();
    let index = ((rank * n as f64).floor() as usize).min(n - 1);
    sorted[index].as_secs_f64()
}

/// Immutable point-in-time copy of the aggregated statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub active_users: usize,
    pub messages_sent: u64,
    pub messages_completed: u64,
    pub messages_failed: u64,
    pub connection_errors: u64,
    pub streaming_errors: u64,
    /// Percentage of sent messages that completed (0-100).
    pub success_rate: f64,
    /// Mean response time in seconds over completed messages.
    pub avg_response_time: f64,
    /// Mean number of streamed fragments per completed message.
    pub avg_tokens: f64,
    pub total_tokens: u64,
    /// Mean time to first fragment in seconds, 0 when none was observed.
    pub avg_time_to_first_token: f64,
    pub percentiles: Option<Percentiles>,
}
