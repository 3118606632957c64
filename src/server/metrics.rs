//! Prometheus metrics for the supervisor and health monitor
//!
//! Exposed on `/metrics` of the status endpoint:
//! - `vigil_probes_total{result}` - probes by outcome label
//! - `vigil_probe_duration_seconds` - probe latency histogram
//! - `vigil_health_state{state}` - 1 for the current state, 0 otherwise
//! - `vigil_signals_forwarded_total{signal}` - signals relayed to the child
//! - `vigil_kill_escalations_total` - SIGKILLs after an expired grace period
//! - `vigil_orphans_reaped_total` - adopted descendants reaped

use crate::health::HealthState;
use crate::probe::{ProbeOutcome, ProbeResult};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

pub type SharedMetrics = Arc<VigilMetrics>;

pub struct VigilMetrics {
    registry: Registry,
    probes_total: IntCounterVec,
    probe_duration_seconds: Histogram,
    health_state: IntGaugeVec,
    signals_forwarded_total: IntCounterVec,
    kill_escalations_total: IntCounter,
    orphans_reaped_total: IntCounter,
}

/// Create and register all metrics in a fresh registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let probes_total = IntCounterVec::new(
        Opts::new("vigil_probes_total", "Health probes by result"),
        &["result"],
    )?;
    let probe_duration_seconds = Histogram::with_opts(
        HistogramOpts::new("vigil_probe_duration_seconds", "Health probe latency")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )?;
    let health_state = IntGaugeVec::new(
        Opts::new("vigil_health_state", "Current health state (1 = active)"),
        &["state"],
    )?;
    let signals_forwarded_total = IntCounterVec::new(
        Opts::new("vigil_signals_forwarded_total", "Signals forwarded to the service"),
        &["signal"],
    )?;
    let kill_escalations_total = IntCounter::new(
        "vigil_kill_escalations_total",
        "Service killed after the shutdown grace period expired",
    )?;
    let orphans_reaped_total =
        IntCounter::new("vigil_orphans_reaped_total", "Orphaned descendants reaped")?;

    registry.register(Box::new(probes_total.clone()))?;
    registry.register(Box::new(probe_duration_seconds.clone()))?;
    registry.register(Box::new(health_state.clone()))?;
    registry.register(Box::new(signals_forwarded_total.clone()))?;
    registry.register(Box::new(kill_escalations_total.clone()))?;
    registry.register(Box::new(orphans_reaped_total.clone()))?;

    let metrics = VigilMetrics {
        registry,
        probes_total,
        probe_duration_seconds,
        health_state,
        signals_forwarded_total,
        kill_escalations_total,
        orphans_reaped_total,
    };
    metrics.set_health_state(HealthState::Starting);

    Ok(Arc::new(metrics))
}

impl VigilMetrics {
    pub fn record_probe(&self, result: &ProbeResult) {
        let label = match &result.outcome {
            ProbeOutcome::Success { .. } => "success",
            ProbeOutcome::Failure(failure) => failure.label(),
        };
        self.probes_total.with_label_values(&[label]).inc();
        self.probe_duration_seconds
            .observe(result.latency.as_secs_f64());
    }

    pub fn set_health_state(&self, current: HealthState) {
        for state in [
            HealthState::Starting,
            HealthState::Healthy,
            HealthState::Unhealthy,
        ] {
            self.health_state
                .with_label_values(&[state.as_str()])
                .set(i64::from(state == current));
        }
    }

    pub fn record_signal_forwarded(&self, signal: &str) {
        self.signals_forwarded_total
            .with_label_values(&[signal])
            .inc();
    }

    pub fn record_kill_escalation(&self) {
        self.kill_escalations_total.inc();
    }

    pub fn record_orphans_reaped(&self, count: usize) {
        self.orphans_reaped_total.inc_by(count as u64);
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
