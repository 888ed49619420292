// src/health/mod.rs
mod probe;
mod registry;
mod report;
mod status;

pub use probe::{FnCheck, HealthCheck, HealthProbe, TagSet, LIVE_TAG, READY_TAG};
pub use registry::{HealthError, HealthRegistry};
pub use report::HealthReport;
pub use status::HealthStatus;
