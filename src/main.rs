use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil::clock::SystemClock;
use vigil::config::RuntimeConfig;
use vigil::error::StartupError;
use vigil::health::{HealthMonitor, MonitorSettings, StatusFile};
use vigil::privilege;
use vigil::probe::HttpProbe;
use vigil::server::{create_metrics, run_status_server, shutdown_channel};
use vigil::supervisor::{enable_subreaper, InitSupervisor, LaunchSpec, UnixProcessControl};

/// Split `[--] <program> [args...]` into a launch spec
pub fn parse_command<I>(args: I) -> Result<LaunchSpec, StartupError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    if args.peek().map(String::as_str) == Some("--") {
        args.next();
    }
    let program = args.next().ok_or(StartupError::Usage)?;
    Ok(LaunchSpec::new(program, args.collect()))
}

/// Address for the status endpoint; hostnames fall back to all interfaces
fn status_addr(bind_host: &str, port: u16) -> SocketAddr {
    let ip = bind_host.parse::<IpAddr>().unwrap_or_else(|_| {
        warn!(host = %bind_host, "Bind host is not an IP address, status endpoint listens on 0.0.0.0");
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });
    SocketAddr::new(ip, port)
}

async fn run() -> Result<i32, StartupError> {
    let command = parse_command(std::env::args().skip(1))?;
    let config = RuntimeConfig::from_env()?;
    info!(
        command = ?command.command_line(),
        health_url = %config.health_url,
        data_dir = %config.data_dir.display(),
        run_as = %config.run_as,
        "Starting vigil"
    );

    let identity = config.run_as.resolve()?;
    privilege::prepare(&config.data_dir, &identity)?;

    let metrics = create_metrics()?;
    let probe = Arc::new(HttpProbe::new()?);
    enable_subreaper();

    // Handlers must exist before the service can receive signals
    let control = UnixProcessControl::new(config.signal_group)?;
    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let mut supervisor = InitSupervisor::new(control, config.kill_grace)
        .with_metrics(metrics.clone())
        .with_shutdown(shutdown_controller);

    let inherited: HashMap<String, String> = std::env::vars().collect();
    let mut spec = command.with_env(config.child_env(&inherited));
    if identity.requires_switch() {
        spec = spec.with_identity(identity);
    } else {
        info!(identity = %identity, "Already running as the service identity");
    }
    let mut process = supervisor.launch(&spec)?;

    let (monitor, health) = HealthMonitor::new(
        MonitorSettings::from(&config),
        probe,
        Arc::new(SystemClock),
    );
    let mut monitor = monitor.with_metrics(metrics.clone());
    if let Some(path) = &config.status_file {
        let file = StatusFile::new(path);
        match file.ensure_dir() {
            Ok(()) => monitor = monitor.with_status_file(file),
            Err(e) => warn!(path = %path.display(), error = %e, "Status file directory unavailable, not writing status file"),
        }
    }
    let monitor_handle = tokio::spawn(monitor.run(shutdown_signal.clone()));

    let status_handle = config.status_port.map(|port| {
        let addr = status_addr(&config.bind_host, port);
        let health = health.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown_signal.clone();
        tokio::spawn(async move {
            if let Err(e) = run_status_server(addr, health, metrics, shutdown).await {
                warn!(error = %e, "Status server failed");
            }
        })
    });

    // Stops the monitor and status server on the first termination signal
    let code = supervisor.supervise(&mut process).await;

    if let Err(e) = monitor_handle.await {
        warn!(error = %e, "Health monitor task failed");
    }
    if let Some(handle) = status_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Status server task failed");
        }
    }

    info!(exit_code = code, "vigil exiting");
    Ok(code)
}

#[tokio::main]
async fn main() {
    // stderr keeps the service's stdout untouched
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Startup failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
