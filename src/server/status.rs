//! Status endpoint for orchestrators that poll over HTTP
//!
//! - `/livez` - Liveness: is the supervisor alive?
//! - `/readyz` - Readiness: is the service healthy?
//! - `/status` - Current health state and last probe as JSON
//! - `/metrics` - Prometheus metrics in text format

use crate::health::{HealthHandle, HealthState, ProbeSummary};
use crate::server::metrics::SharedMetrics;
use crate::server::ShutdownSignal;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Combined server state for status and metrics endpoints
#[derive(Clone)]
pub struct ServerState {
    health: HealthHandle,
    metrics: SharedMetrics,
}

impl ServerState {
    pub fn new(health: HealthHandle, metrics: SharedMetrics) -> Self {
        Self { health, metrics }
    }
}

/// Body of `GET /status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_probe: Option<ProbeSummary>,
}

/// Liveness probe handler
///
/// Always returns 200 OK - if this responds, the supervisor is alive.
async fn livez() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe handler
///
/// Returns 200 OK only when healthy; starting and unhealthy both get 503.
async fn readyz(State(state): State<ServerState>) -> StatusCode {
    match state.health.current_state() {
        HealthState::Healthy => StatusCode::OK,
        HealthState::Starting | HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn status(State(state): State<ServerState>) -> Json<StatusReport> {
    Json(StatusReport {
        state: state.health.current_state(),
        consecutive_failures: state.health.consecutive_failures(),
        last_probe: state.health.last_probe(),
    })
}

/// Prometheus metrics handler
async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Build the router for status and metrics endpoints
pub fn build_router(health: HealthHandle, metrics: SharedMetrics) -> Router {
    let state = ServerState::new(health, metrics);

    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/metrics", get(self::metrics))
        .with_state(state)
}

/// Serve the status endpoint on an already bound listener until shutdown
pub async fn serve_status(
    listener: TcpListener,
    health: HealthHandle,
    metrics: SharedMetrics,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = build_router(health, metrics);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}

/// Bind `addr` and serve the status endpoint until shutdown
pub async fn run_status_server(
    addr: SocketAddr,
    health: HealthHandle,
    metrics: SharedMetrics,
    shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    // Log after successful bind - server is actually listening
    info!(addr = %addr, "Status server listening");

    serve_status(listener, health, metrics, shutdown).await
}
