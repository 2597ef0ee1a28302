/// Background task printing periodic statistics.
use super::render::render_periodic;
use crate::shutdown::ShutdownListener;
use crate::stats::StatsAggregator;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Snapshots the aggregator on a fixed interval and writes a report.
///
/// Only reads from the aggregator, so its cadence has no effect on the
/// numbers it prints.
pub struct Reporter {
    stats: Arc<StatsAggregator>,
    interval: Duration,
    node_id: u32,
    started: Instant,
}

impl Reporter {
    pub fn new(stats: Arc<StatsAggregator>, interval: Duration, node_id: u32) -> Self {
        Self {
            stats,
            interval,
            node_id,
            started: Instant::now(),
        }
    }

    /// Spawn the reporting loop; it ends once `stop` is raised.
    pub fn spawn<W>(self, out: W, stop: ShutdownListener) -> JoinHandle<()>
    where
        W: Write + Send + 'static,
    {
        tokio::spawn(self.run(out, stop))
    }

    async fn run<W: Write>(self, mut out: W, mut stop: ShutdownListener) {
        if self.interval.is_zero() {
            warn!("report interval is zero, periodic reports disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.stats.snapshot();
                    let text = render_periodic(&snapshot, self.started.elapsed(), self.node_id);
                    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
                        warn!(error = %e, "failed to write periodic report");
                    }
                }
                _ = stop.triggered() => {
                    debug!("reporter stopped");
                    break;
                }
            }
        }
    }
}
