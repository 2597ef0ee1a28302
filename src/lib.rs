/// Chatload library - exposes modules for testing and external use.
pub mod cli;
pub mod error;
pub mod http;
pub mod prompts;
pub mod report;
pub mod session;
pub mod shutdown;
pub mod simulator;
pub mod stats;
pub mod stream;
pub mod transcript;
