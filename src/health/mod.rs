//! Health-gated readiness
//!
//! `HealthMonitor` probes the service on an interval and folds results into
//! a `HealthState` (starting / healthy / unhealthy) that orchestrators read
//! through `HealthHandle`, the status file, or the status endpoint.

mod monitor;
mod state;
mod status_file;
mod tracker;

pub use monitor::{HealthMonitor, MonitorSettings};
pub use state::{health_channel, HealthHandle, HealthPublisher, HealthState, ProbeSummary};
pub use status_file::{read_status_file, StatusFile};
pub use tracker::HealthTracker;
