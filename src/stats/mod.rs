/// Run-wide statistics aggregation.
pub mod aggregator;
pub mod types;

pub use aggregator::{ActiveGuard, StatsAggregator};
pub use types::{FailureCategory, Percentiles, StatsSnapshot};
