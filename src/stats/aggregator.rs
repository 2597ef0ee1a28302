/// Thread-safe statistics aggregator shared by every user session.
use super::types::{FailureCategory, Percentiles, StatsSnapshot};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Counters {
    active_users: usize,
    messages_sent: u64,
    messages_completed: u64,
    messages_failed: u64,
    connection_errors: u64,
    streaming_errors: u64,
    total_tokens: u64,
    total_response_time: Duration,
    response_times: Vec<Duration>,
    total_time_to_first_token: Duration,
    first_token_samples: u64,
}

/// Run-wide counters, timings and response-time samples.
///
/// Every read and write goes through a single mutex, so a [`snapshot`] never
/// observes a counter mid-update. None of the operations can fail: a
/// poisoned lock is recovered, since the counters stay meaningful even if a
/// holder panicked between two increments.
///
/// [`snapshot`]: StatsAggregator::snapshot
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<Counters>,
}

impl StatsAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one message as sent.
    pub fn record_sent(&self) {
        self.lock().messages_sent += 1;
    }

    /// Count one completed message with its response time and fragment count.
    pub fn record_completed(&self, elapsed: Duration, token_count: u64) {
        let mut counters = self.lock();
        counters.messages_completed += 1;
        counters.total_response_time += elapsed;
        counters.response_times.push(elapsed);
        counters.total_tokens += token_count;
    }

    /// Record the delay between request start and the first streamed fragment.
    pub fn record_first_token(&self, ttft: Duration) {
        let mut counters = self.lock();
        counters.total_time_to_first_token += ttft;
        counters.first_token_samples += 1;
    }

    /// Count one failed message.
    pub fn record_failed(&self, category: FailureCategory) {
        let mut counters = self.lock();
        counters.messages_failed += 1;
        match category {
            FailureCategory::Connection => counters.connection_errors += 1,
            FailureCategory::Streaming => counters.streaming_errors += 1,
            FailureCategory::General => {}
        }
    }

    pub fn increment_active(&self) {
        self.lock().active_users += 1;
    }

    /// Saturates at zero; prefer [`enter_session`](Self::enter_session) to
    /// keep calls paired.
    pub fn decrement_active(&self) {
        let mut counters = self.lock();
        counters.active_users = counters.active_users.saturating_sub(1);
    }

    /// Mark one session active until the returned guard is dropped.
    pub fn enter_session(self: &Arc<Self>) -> ActiveGuard {
        self.increment_active();
        ActiveGuard {
            stats: Arc::clone(self),
        }
    }

    /// Take a consistent copy of the current statistics.
    ///
    /// Only the copy happens under the lock; sorting for percentiles is done
    /// on the copy so writers are not held up by it.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut counters = self.lock().clone();
        counters.response_times.sort_unstable();

        let success_rate = if counters.messages_sent > 0 {
            counters.messages_completed as f64 / counters.messages_sent as f64 * 100.0
        } else {
            0.0
        };
        let avg_response_time = if counters.response_times.is_empty() {
            0.0
        } else {
            counters.total_response_time.as_secs_f64() / counters.response_times.len() as f64
        };
        let avg_tokens = if counters.messages_completed > 0 {
            counters.total_tokens as f64 / counters.messages_completed as f64
        } else {
            0.0
        };
        let avg_time_to_first_token = if counters.first_token_samples > 0 {
            counters.total_time_to_first_token.as_secs_f64() / counters.first_token_samples as f64
        } else {
            0.0
        };

        StatsSnapshot {
            active_users: counters.active_users,
            messages_sent: counters.messages_sent,
            messages_completed: counters.messages_completed,
            messages_failed: counters.messages_failed,
            connection_errors: counters.connection_errors,
            streaming_errors: counters.streaming_errors,
            success_rate,
            avg_response_time,
            avg_tokens,
            total_tokens: counters.total_tokens,
            avg_time_to_first_token,
            percentiles: Percentiles::from_sorted(&counters.response_times),
        }
    }
}

/// Keeps one session counted as active; decrements on drop.
#[derive(Debug)]
pub struct ActiveGuard {
    stats: Arc<StatsAggregator>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.stats.decrement_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snapshot = StatsAggregator::new().snapshot();
        assert_eq!(snapshot.messages_sent, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.avg_response_time, 0.0);
        assert_eq!(snapshot.avg_tokens, 0.0);
        assert_eq!(snapshot.avg_time_to_first_token, 0.0);
        assert!(snapshot.percentiles.is_none());
    }

    #[test]
    fn snapshot_derives_averages_and_rate() {
        let stats = StatsAggregator::new();
        for _ in 0..4 {
            stats.record_sent();
        }
        stats.record_completed(Duration::from_secs(1), 10);
        stats.record_completed(Duration::from_secs(3), 30);
        stats.record_failed(FailureCategory::Connection);
        stats.record_failed(FailureCategory::Streaming);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_completed, 2);
        assert_eq!(snapshot.messages_failed, 2);
        assert_eq!(snapshot.connection_errors, 1);
        assert_eq!(snapshot.streaming_errors, 1);
        assert_eq!(snapshot.success_rate, 50.0);
        assert_eq!(snapshot.avg_response_time, 2.0);
        assert_eq!(snapshot.avg_tokens, 20.0);
        assert_eq!(snapshot.total_tokens, 40);
    }

    #[test]
    fn general_failures_do_not_touch_sub_counters() {
        let stats = StatsAggregator::new();
        stats.record_sent();
        stats.record_failed(FailureCategory::General);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_failed, 1);
        assert_eq!(snapshot.connection_errors, 0);
        assert_eq!(snapshot.streaming_errors, 0);
    }

    #[test]
    fn snapshot_percentiles_follow_nearest_rank() {
        let stats = StatsAggregator::new();
        for secs in [5, 3, 1, 4, 2] {
            stats.record_sent();
            stats.record_completed(Duration::from_secs(secs), 1);
        }
        let p = stats.snapshot().percentiles.unwrap();
        assert_eq!((p.p50, p.p90, p.p95, p.p99), (3.0, 5.0, 5.0, 5.0));
    }

    #[test]
    fn first_token_average() {
        let stats = StatsAggregator::new();
        stats.record_first_token(Duration::from_millis(100));
        stats.record_first_token(Duration::from_millis(300));
        let ttft = stats.snapshot().avg_time_to_first_token;
        assert!((ttft - 0.2).abs() < 1e-9);
    }

    #[test]
    fn active_count_never_goes_negative() {
        let stats = StatsAggregator::new();
        stats.decrement_active();
        assert_eq!(stats.snapshot().active_users, 0);
    }

    #[test]
    fn active_guard_pairs_increment_and_decrement() {
        let stats = Arc::new(StatsAggregator::new());
        {
            let _a = stats.enter_session();
            let _b = stats.enter_session();
            assert_eq!(stats.snapshot().active_users, 2);
        }
        assert_eq!(stats.snapshot().active_users, 0);
    }

    #[test]
    fn concurrent_updates_keep_outcomes_bounded_by_sent() {
        let stats = Arc::new(StatsAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    let _guard = stats.enter_session();
                    for i in 0..500u64 {
                        stats.record_sent();
                        if (i + worker) % 3 == 0 {
                            stats.record_failed(FailureCategory::Connection);
                        } else if i % 7 != 0 {
                            stats.record_completed(Duration::from_millis(i), 2);
                        }
                        let snapshot = stats.snapshot();
                        assert!(
                            snapshot.messages_completed + snapshot.messages_failed
                                <= snapshot.messages_sent
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_sent, 4000);
        assert!(snapshot.messages_completed + snapshot.messages_failed <= snapshot.messages_sent);
        assert_eq!(snapshot.total_tokens, snapshot.messages_completed * 2);
        assert_eq!(snapshot.active_users, 0);
    }
}
