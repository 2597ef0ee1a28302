/// Periodic and final console reports.
pub mod render;
pub mod reporter;

pub use render::{render_periodic, FinalReport, Throughput};
pub use reporter::Reporter;
