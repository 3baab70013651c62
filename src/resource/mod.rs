//! Resource sampling and monitoring
//!
//! - **ResourceSampler**: point-in-time readings of memory, CPU and free disk
//! - **ResourceMonitor**: rolling history while a run is active, summarized on stop

mod monitor;
mod sampler;

pub use monitor::{ResourceMonitor, ResourceUsageSummary};
pub use sampler::{ResourceMetrics, ResourceSampler, SystemSampler};
