//! Published health state
//!
//! `HealthPublisher` is the only writer and is not `Clone`;
//! `HealthHandle` is the cloneable read side handed to the status endpoint.

use crate::probe::{ProbeOutcome, ProbeResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HealthState {
    Starting = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Starting => "starting",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Starting,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "starting" => Ok(HealthState::Starting),
            "healthy" => Ok(HealthState::Healthy),
            "unhealthy" => Ok(HealthState::Unhealthy),
            other => Err(format!("unknown health state '{}'", other)),
        }
    }
}

/// Last probe, as shown on the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub latency_ms: u64,
}

impl From<&ProbeResult> for ProbeSummary {
    fn from(result: &ProbeResult) -> Self {
        let reason = match &result.outcome {
            ProbeOutcome::Success { .. } => None,
            ProbeOutcome::Failure(failure) => Some(failure.to_string()),
        };
        ProbeSummary {
            timestamp: result.timestamp,
            success: result.outcome.is_success(),
            reason,
            latency_ms: u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    last_probe: RwLock<Option<ProbeSummary>>,
}

/// Write side, owned by `HealthMonitor`
#[derive(Debug)]
pub struct HealthPublisher {
    shared: Arc<Shared>,
}

/// Read side, cheap to clone
#[derive(Debug, Clone)]
pub struct HealthHandle {
    shared: Arc<Shared>,
}

/// Create a publisher/handle pair in the `Starting` state
pub fn health_channel() -> (HealthPublisher, HealthHandle) {
    let shared = Arc::new(Shared {
        state: AtomicU8::new(HealthState::Starting as u8),
        consecutive_failures: AtomicU32::new(0),
        last_probe: RwLock::new(None),
    });
    (
        HealthPublisher {
            shared: shared.clone(),
        },
        HealthHandle { shared },
    )
}

impl HealthPublisher {
    pub fn publish(&self, state: HealthState, consecutive_failures: u32, probe: &ProbeResult) {
        if let Ok(mut last) = self.shared.last_probe.write() {
            *last = Some(ProbeSummary::from(probe));
        }
        self.shared
            .consecutive_failures
            .store(consecutive_failures, Ordering::Release);
        self.shared.state.store(state as u8, Ordering::Release);
    }
}

impl HealthHandle {
    /// Latest committed state (lock-free)
    pub fn current_state(&self) -> HealthState {
        HealthState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn last_probe(&self) -> Option<ProbeSummary> {
        self.shared
            .last_probe
            .read()
            .ok()
            .and_then(|last| last.clone())
    }
}
