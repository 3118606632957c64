//! Health state machine
//!
//! Slow to fail, fast to recover:
//! - inside the start period failures are ignored, a success is honoured
//! - after it, `failure_threshold` consecutive failures flip to `Unhealthy`
//! - a single success always returns to `Healthy`
//!
//! A service that never succeeded stays `Starting` after the start period
//! until it either succeeds or reaches the failure threshold.
//!
//! Time is monotonic: wall-clock steps (NTP, a container restored from a
//! checkpoint) cannot shorten or extend the start period.

use super::HealthState;
use crate::probe::ProbeOutcome;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct HealthTracker {
    started_at: Instant,
    start_period: Duration,
    failure_threshold: u32,
    consecutive_failures: u32,
    state: HealthState,
}

impl HealthTracker {
    /// A threshold of 0 is treated as 1.
    pub fn new(started_at: Instant, start_period: Duration, failure_threshold: u32) -> Self {
        Self {
            started_at,
            start_period,
            failure_threshold: failure_threshold.max(1),
            consecutive_failures: 0,
            state: HealthState::Starting,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True while `at` falls inside `[started_at, started_at + start_period)`
    ///
    /// An instant before `started_at` counts as inside.
    pub fn in_start_period(&self, at: Instant) -> bool {
        at.saturating_duration_since(self.started_at) < self.start_period
    }

    /// Fold one probe outcome observed at `at` into the state
    pub fn observe(&mut self, outcome: &ProbeOutcome, at: Instant) -> HealthState {
        match outcome {
            ProbeOutcome::Success { .. } => {
                self.consecutive_failures = 0;
                self.state = HealthState::Healthy;
            }
            ProbeOutcome::Failure(_) if self.in_start_period(at) => {}
            ProbeOutcome::Failure(_) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= self.failure_threshold {
                    self.state = HealthState::Unhealthy;
                }
            }
        }
        self.state
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
