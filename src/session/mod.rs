/// Simulated user sessions.
pub mod config;
pub mod outcome;
pub mod user;

pub use config::{DelayRange, Pacing, StopCondition};
pub use outcome::{Outcome, OutcomeStatus};
pub use user::{SessionConfig, SessionReport, UserSession};
