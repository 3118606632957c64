//! Interval-driven health monitor
//!
//! One probe per tick, awaited before the next tick is taken, so probes
//! never overlap. Each probe is cut off at `timeout` even if the prober
//! ignores its own deadline. Shutdown cancels a probe in flight.
//!
//! The start period is measured on the monotonic clock; the injected `Clock`
//! only stamps probe results.

use super::{health_channel, HealthHandle, HealthPublisher, HealthState, HealthTracker, StatusFile};
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::probe::{ProbeOutcome, ProbeResult, Prober};
use crate::server::metrics::SharedMetrics;
use crate::server::ShutdownSignal;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Probe target and timing
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub url: Url,
    pub interval: Duration,
    pub timeout: Duration,
    pub start_period: Duration,
    pub failure_threshold: u32,
}

impl From<&RuntimeConfig> for MonitorSettings {
    fn from(config: &RuntimeConfig) -> Self {
        MonitorSettings {
            url: config.health_url.clone(),
            interval: config.probe_interval,
            timeout: config.probe_timeout,
            start_period: config.start_period,
            failure_threshold: config.failure_threshold,
        }
    }
}

pub struct HealthMonitor {
    settings: MonitorSettings,
    prober: Arc<dyn Prober>,
    clock: Arc<dyn Clock>,
    tracker: HealthTracker,
    publisher: HealthPublisher,
    status_file: Option<StatusFile>,
    metrics: Option<SharedMetrics>,
}

impl HealthMonitor {
    /// Create a monitor whose start period begins now
    ///
    /// Returns the monitor and the read handle for its state.
    pub fn new(
        settings: MonitorSettings,
        prober: Arc<dyn Prober>,
        clock: Arc<dyn Clock>,
    ) -> (Self, HealthHandle) {
        let (publisher, handle) = health_channel();
        let tracker = HealthTracker::new(
            Instant::now(),
            settings.start_period,
            settings.failure_threshold,
        );
        let monitor = HealthMonitor {
            settings,
            prober,
            clock,
            tracker,
            publisher,
            status_file: None,
            metrics: None,
        };
        (monitor, handle)
    }

    pub fn with_status_file(mut self, status_file: StatusFile) -> Self {
        self.status_file = Some(status_file);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Probe until `shutdown` fires
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        info!(
            url = %self.settings.url,
            interval = ?self.settings.interval,
            timeout = ?self.settings.timeout,
            start_period = ?self.settings.start_period,
            failure_threshold = self.settings.failure_threshold,
            "Health monitor started"
        );
        self.write_status_file(HealthState::Starting).await;

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            let (probed_at, result) = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                probe = self.probe_once() => probe,
            };

            self.record(probed_at, result).await;
        }

        info!(state = %self.tracker.state(), "Health monitor stopped");
    }

    async fn probe_once(&self) -> (Instant, ProbeResult) {
        let probed_at = Instant::now();
        let timestamp = self.clock.now();
        let timeout = self.settings.timeout;
        let result = match tokio::time::timeout(timeout, self.prober.check(&self.settings.url, timeout)).await {
            Ok(result) => result,
            Err(_) => ProbeResult::timed_out(timestamp, timeout),
        };
        (probed_at, result)
    }

    async fn record(&mut self, probed_at: Instant, result: ProbeResult) {
        let previous = self.tracker.state();
        let state = self.tracker.observe(&result.outcome, probed_at);
        let failures = self.tracker.consecutive_failures();

        self.publisher.publish(state, failures, &result);
        if let Some(ref metrics) = self.metrics {
            metrics.record_probe(&result);
            metrics.set_health_state(state);
        }

        if let ProbeOutcome::Failure(ref reason) = result.outcome {
            debug!(
                reason = %reason,
                consecutive_failures = failures,
                in_start_period = self.tracker.in_start_period(probed_at),
                "Health probe failed"
            );
        }

        if state != previous {
            match state {
                HealthState::Unhealthy => warn!(
                    from = %previous,
                    consecutive_failures = failures,
                    "Service is unhealthy"
                ),
                _ => info!(from = %previous, to = %state, "Health state changed"),
            }
            self.write_status_file(state).await;
        }
    }

    async fn write_status_file(&self, state: HealthState) {
        let Some(ref file) = self.status_file else {
            return;
        };
        if let Err(e) = file.write(state).await {
            warn!(path = %file.path().display(), error = %e, "Failed to write health status file");
        }
    }
}

#[cfg(test)]
#[path = "monitor_test.rs"]
mod tests;
