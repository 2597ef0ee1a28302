/// Load test orchestration and configuration.
pub mod config;
pub mod orchestrator;

pub use config::{LoadTestConfig, PartialConfig};
pub use orchestrator::Orchestrator;
