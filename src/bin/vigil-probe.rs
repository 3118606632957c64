//! One-shot health check for `HEALTHCHECK CMD`-style orchestrators
//!
//! Reports the state the running supervisor wrote to its status file. When
//! there is no status file (disabled, or vigil not running) it probes the
//! configured health URL once instead.
//!
//! Exit code 0 means healthy, 1 anything else.

use anyhow::Context;
use std::process::exit;
use vigil::config::RuntimeConfig;
use vigil::health::{read_status_file, HealthState};
use vigil::probe::{HttpProbe, ProbeOutcome, Prober};

async fn check() -> anyhow::Result<bool> {
    let config = RuntimeConfig::from_env().context("Invalid configuration")?;

    if let Some(path) = &config.status_file {
        let state = read_status_file(path)
            .await
            .with_context(|| format!("Failed to read status file {}", path.display()))?;
        if let Some(state) = state {
            println!("{}", state);
            return Ok(state == HealthState::Healthy);
        }
    }

    let result = HttpProbe::new()
        .context("Failed to build HTTP client")?
        .check(&config.health_url, config.probe_timeout)
        .await;
    match &result.outcome {
        ProbeOutcome::Success { status } => {
            println!("Health OK: {} ({} ms)", status, result.latency.as_millis());
            Ok(true)
        }
        ProbeOutcome::Failure(reason) => {
            println!("Unhealthy: {}", reason);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() {
    match check().await {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(e) => {
            eprintln!("vigil-probe: {:#}", e);
            exit(1);
        }
    }
}
