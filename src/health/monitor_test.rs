//! Tests for the interval-driven monitor
//!
//! Timer-driven tests run on tokio's paused clock, so "seconds" pass
//! instantly and deterministically.

use super::*;
use crate::clock::TokioClock;
use crate::probe::ProbeFailure;
use crate::server::shutdown_channel;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Prober that replays a script, then repeats a fallback outcome
struct ScriptedProber {
    script: Mutex<VecDeque<ProbeOutcome>>,
    fallback: ProbeOutcome,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    fn new(script: Vec<ProbeOutcome>, fallback: ProbeOutcome) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the probe is cancelled
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn check(&self, _url: &Url, _timeout: Duration) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        #[allow(clippy::unwrap_used)]
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        ProbeResult {
            timestamp: Utc::now(),
            outcome,
            latency: self.delay,
        }
    }
}

fn ok() -> ProbeOutcome {
    ProbeOutcome::Success { status: 200 }
}

fn server_error() -> ProbeOutcome {
    ProbeOutcome::Failure(ProbeFailure::BadStatus(500))
}

fn refused() -> ProbeOutcome {
    ProbeOutcome::Failure(ProbeFailure::ConnectionRefused)
}

fn settings(interval_ms: u64, timeout_ms: u64, start_period: u64, threshold: u32) -> MonitorSettings {
    MonitorSettings {
        url: Url::parse("http://127.0.0.1:5000/").expect("valid url"),
        interval: Duration::from_millis(interval_ms),
        timeout: Duration::from_millis(timeout_ms),
        start_period: Duration::from_secs(start_period),
        failure_threshold: threshold,
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// threshold=3, interval=1s: 500s at t=0,1,2 then 200 at t=3
#[tokio::test(start_paused = true)]
async fn test_unhealthy_after_threshold_then_recovers() {
    let prober = Arc::new(ScriptedProber::new(
        vec![server_error(), server_error(), server_error()],
        ok(),
    ));
    let (monitor, health) =
        HealthMonitor::new(settings(1000, 500, 0, 3), prober.clone(), Arc::new(TokioClock::new()));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(1500).await;
    assert_eq!(health.current_state(), HealthState::Starting);
    assert_eq!(health.consecutive_failures(), 2);

    sleep_ms(1000).await;
    assert_eq!(health.current_state(), HealthState::Unhealthy, "after probe at t=2");

    sleep_ms(1000).await;
    assert_eq!(health.current_state(), HealthState::Healthy, "after probe at t=3");
    assert_eq!(health.consecutive_failures(), 0);

    controller.shutdown();
    handle.await.expect("monitor task");
}

/// start_period=10s, service unreachable until t=12
#[tokio::test(start_paused = true)]
async fn test_slow_start_stays_starting_until_first_success() {
    let prober = Arc::new(ScriptedProber::new(vec![refused(); 12], ok()));
    let (monitor, health) =
        HealthMonitor::new(settings(1000, 500, 10, 3), prober.clone(), Arc::new(TokioClock::new()));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(9500).await;
    assert_eq!(health.current_state(), HealthState::Starting);
    assert_eq!(health.consecutive_failures(), 0, "grace period failures are not counted");

    sleep_ms(2000).await;
    assert_eq!(health.current_state(), HealthState::Starting);
    assert_eq!(health.consecutive_failures(), 2);

    sleep_ms(1000).await;
    assert_eq!(health.current_state(), HealthState::Healthy, "first success at t=12");

    controller.shutdown();
    handle.await.expect("monitor task");
}

/// Wall time frozen at launch: the start period still ends on monotonic time
#[tokio::test(start_paused = true)]
async fn test_start_period_ignores_wall_clock() {
    let frozen = crate::clock::FixedClock(Utc::now());
    let prober = Arc::new(ScriptedProber::new(vec![], refused()));
    let (monitor, health) =
        HealthMonitor::new(settings(1000, 500, 2, 2), prober.clone(), Arc::new(frozen));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(1500).await;
    assert_eq!(health.current_state(), HealthState::Starting);
    assert_eq!(health.consecutive_failures(), 0);

    // Probes at t=2 and t=3 fall outside the start period
    sleep_ms(2000).await;
    assert_eq!(health.current_state(), HealthState::Unhealthy);

    controller.shutdown();
    handle.await.expect("monitor task");
}

#[tokio::test(start_paused = true)]
async fn test_probes_never_overlap() {
    let prober = Arc::new(ScriptedProber::new(vec![], ok()).with_delay(Duration::from_millis(900)));
    let (monitor, _health) =
        HealthMonitor::new(settings(1000, 950, 0, 3), prober.clone(), Arc::new(TokioClock::new()));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(10_500).await;
    controller.shutdown();
    handle.await.expect("monitor task");

    assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(prober.calls(), 11, "one probe per tick at t=0..=10");
}

#[tokio::test(start_paused = true)]
async fn test_hung_probe_is_cut_at_timeout() {
    let prober =
        Arc::new(ScriptedProber::new(vec![], ok()).with_delay(Duration::from_secs(3600)));
    let (monitor, health) =
        HealthMonitor::new(settings(1000, 300, 0, 2), prober.clone(), Arc::new(TokioClock::new()));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(1500).await;
    assert_eq!(prober.calls(), 2, "a hung probe must not delay the next one");
    assert_eq!(health.current_state(), HealthState::Unhealthy);
    let last = health.last_probe().expect("probe recorded");
    assert!(!last.success);
    assert_eq!(last.reason.as_deref(), Some("timed out"));
    assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 1);

    controller.shutdown();
    handle.await.expect("monitor task");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_in_flight_probe() {
    let prober =
        Arc::new(ScriptedProber::new(vec![], ok()).with_delay(Duration::from_secs(3600)));
    let (monitor, _health) = HealthMonitor::new(
        settings(60_000, 30_000, 0, 3),
        prober.clone(),
        Arc::new(TokioClock::new()),
    );
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(100).await;
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 1);

    controller.shutdown();
    let stopped = tokio::time::timeout(Duration::from_millis(10), handle).await;

    assert!(stopped.is_ok(), "monitor must stop without waiting for the probe");
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(prober.calls(), 1);
}

#[tokio::test]
async fn test_status_file_tracks_transitions() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("health");
    let prober = Arc::new(ScriptedProber::new(vec![refused()], ok()));
    let (monitor, health) = HealthMonitor::new(
        settings(20, 10, 0, 5),
        prober.clone(),
        Arc::new(crate::clock::SystemClock),
    );
    let monitor = monitor.with_status_file(StatusFile::new(&path));
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    let mut state = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        state = crate::health::read_status_file(&path).await.ok().flatten();
        if state == Some(HealthState::Healthy) {
            break;
        }
    }

    controller.shutdown();
    handle.await.expect("monitor task");

    assert_eq!(state, Some(HealthState::Healthy));
    assert_eq!(health.current_state(), HealthState::Healthy);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_follow_probes() {
    let metrics = crate::server::create_metrics().expect("metrics");
    let prober = Arc::new(ScriptedProber::new(vec![server_error()], ok()));
    let (monitor, _health) =
        HealthMonitor::new(settings(1000, 500, 0, 3), prober.clone(), Arc::new(TokioClock::new()));
    let monitor = monitor.with_metrics(metrics.clone());
    let (controller, signal) = shutdown_channel();
    let handle = tokio::spawn(monitor.run(signal));

    sleep_ms(1500).await;
    controller.shutdown();
    handle.await.expect("monitor task");

    let text = metrics.encode().expect("encode");
    assert!(text.contains(r#"vigil_probes_total{result="bad_status"} 1"#));
    assert!(text.contains(r#"vigil_probes_total{result="success"} 1"#));
    assert!(text.contains(r#"vigil_health_state{state="healthy"} 1"#));
}
