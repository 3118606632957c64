//! Single bounded HTTP health check
//!
//! A probe issues exactly one GET and classifies the result. It never
//! retries and never returns an error: every failure mode becomes a
//! `ProbeFailure` inside the `ProbeResult`. Retry and debounce policy belongs
//! to `HealthMonitor`.

use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a probe did not pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("unexpected HTTP status {0}")]
    BadStatus(u16),

    #[error("DNS resolution failed")]
    DnsError,

    #[error("transport error: {0}")]
    Transport(String),
}

impl ProbeFailure {
    /// Short label for metrics and the status endpoint
    pub fn label(&self) -> &'static str {
        match self {
            ProbeFailure::Timeout => "timeout",
            ProbeFailure::ConnectionRefused => "connection_refused",
            ProbeFailure::BadStatus(_) => "bad_status",
            ProbeFailure::DnsError => "dns_error",
            ProbeFailure::Transport(_) => "transport",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { status: u16 },
    Failure(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

/// Result of one probe, folded into the health state and then dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub latency: Duration,
}

impl ProbeResult {
    /// Result for a probe cut off by the caller's hard deadline
    pub fn timed_out(timestamp: DateTime<Utc>, timeout: Duration) -> Self {
        ProbeResult {
            timestamp,
            outcome: ProbeOutcome::Failure(ProbeFailure::Timeout),
            latency: timeout,
        }
    }
}

/// Classify an HTTP status: pass iff 2xx or 3xx
pub fn classify_status(status: u16) -> ProbeOutcome {
    if (200..400).contains(&status) {
        ProbeOutcome::Success { status }
    } else {
        ProbeOutcome::Failure(ProbeFailure::BadStatus(status))
    }
}

/// Trait for performing one health check
///
/// Production code uses `HttpProbe`. Tests use scripted probes.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn check(&self, url: &Url, timeout: Duration) -> ProbeResult;
}

/// HTTP GET prober
///
/// Redirects are not followed (a 3xx is itself a pass) and proxy
/// environment variables are ignored, since the target is normally loopback.
pub struct HttpProbe {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl HttpProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Fails when the TLS backend cannot be initialised; a default client
    /// would silently follow redirects and honour proxies
    pub fn with_clock(clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, clock })
    }
}

#[async_trait]
impl Prober for HttpProbe {
    async fn check(&self, url: &Url, timeout: Duration) -> ProbeResult {
        let timestamp = self.clock.now();
        let started = Instant::now();

        let request = self.client.get(url.clone()).timeout(timeout).send();

        // The client timeout covers the request; the outer deadline covers
        // everything else (connection pool waits, DNS on a blocking thread).
        let outcome = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => classify_status(response.status().as_u16()),
            Ok(Err(e)) => ProbeOutcome::Failure(classify_error(&e)),
            Err(_) => ProbeOutcome::Failure(ProbeFailure::Timeout),
        };

        ProbeResult {
            timestamp,
            outcome,
            latency: started.elapsed(),
        }
    }
}

/// Map a reqwest error onto a failure reason
fn classify_error(err: &reqwest::Error) -> ProbeFailure {
    if err.is_timeout() {
        return ProbeFailure::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return ProbeFailure::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return ProbeFailure::Timeout,
                _ => {}
            }
        }
        // hyper-util reports resolver failures as "dns error"
        let message = cause.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return ProbeFailure::DnsError;
        }
        source = cause.source();
    }

    ProbeFailure::Transport(err.to_string())
}

#[cfg(test)]
#[path = "probe_test.rs"]
mod tests;
