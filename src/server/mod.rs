//! HTTP status endpoint, metrics, and shutdown fan-out
//!
//! Provides orchestrator probes:
//! - `/livez` - Liveness probe (supervisor is running)
//! - `/readyz` - Readiness probe (service is healthy)
//!
//! Also provides the shutdown channel that stops background tasks.

pub mod metrics;
pub mod shutdown;
mod status;

pub use metrics::{create_metrics, SharedMetrics, VigilMetrics};
pub use shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};
pub use status::{build_router, run_status_server, serve_status, StatusReport};

#[cfg(test)]
#[path = "status_test.rs"]
mod status_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
