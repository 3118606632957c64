//! Runtime configuration resolved from the environment
//!
//! Every setting has a default, so an empty environment yields a usable
//! config. A variable that is present but malformed is a hard error: the
//! container refuses to start rather than guessing. Present but empty counts
//! as malformed, except for `VIGIL_STATUS_FILE` where empty disables the file.
//!
//! | Variable | Default |
//! |---|---|
//! | `VIGIL_BIND_HOST` | `0.0.0.0` |
//! | `VIGIL_BIND_PORT` | `5000` |
//! | `VIGIL_HEALTH_URL` | `http://127.0.0.1:<port>/` |
//! | `VIGIL_PROBE_INTERVAL` | `30s` |
//! | `VIGIL_PROBE_TIMEOUT` | `5s` |
//! | `VIGIL_START_PERIOD` | `10s` |
//! | `VIGIL_FAILURE_THRESHOLD` | `3` |
//! | `VIGIL_RUN_AS` | `app` |
//! | `VIGIL_DATA_DIR` | `/data` |
//! | `VIGIL_KILL_GRACE` | `10s` |
//! | `VIGIL_SIGNAL_GROUP` | `false` |
//! | `VIGIL_STATUS_PORT` | disabled |
//! | `VIGIL_STATUS_FILE` | `/run/vigil/health`; empty disables |

mod duration;

pub use duration::parse_duration;

use crate::privilege::IdentitySpec;
use reqwest::Url;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_BIND_HOST: &str = "VIGIL_BIND_HOST";
pub const ENV_BIND_PORT: &str = "VIGIL_BIND_PORT";
pub const ENV_HEALTH_URL: &str = "VIGIL_HEALTH_URL";
pub const ENV_PROBE_INTERVAL: &str = "VIGIL_PROBE_INTERVAL";
pub const ENV_PROBE_TIMEOUT: &str = "VIGIL_PROBE_TIMEOUT";
pub const ENV_START_PERIOD: &str = "VIGIL_START_PERIOD";
pub const ENV_FAILURE_THRESHOLD: &str = "VIGIL_FAILURE_THRESHOLD";
pub const ENV_RUN_AS: &str = "VIGIL_RUN_AS";
pub const ENV_DATA_DIR: &str = "VIGIL_DATA_DIR";
pub const ENV_KILL_GRACE: &str = "VIGIL_KILL_GRACE";
pub const ENV_SIGNAL_GROUP: &str = "VIGIL_SIGNAL_GROUP";
pub const ENV_STATUS_PORT: &str = "VIGIL_STATUS_PORT";
pub const ENV_STATUS_FILE: &str = "VIGIL_STATUS_FILE";

const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_BIND_PORT: u16 = 5000;
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_START_PERIOD: Duration = Duration::from_secs(10);
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RUN_AS: &str = "app";
const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_STATUS_FILE: &str = "/run/vigil/health";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("probe timeout ({timeout:?}) must be shorter than probe interval ({interval:?})")]
    TimeoutNotBelowInterval {
        timeout: Duration,
        interval: Duration,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Immutable configuration, resolved once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub health_url: Url,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub start_period: Duration,
    pub failure_threshold: u32,
    pub run_as: IdentitySpec,
    pub data_dir: PathBuf,
    pub kill_grace: Duration,
    pub signal_group: bool,
    pub status_port: Option<u16>,
    pub status_file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Resolve from a snapshot of the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        resolve(&env)
    }

    /// Environment the service process receives on top of its inherited one
    ///
    /// Variables already present in `inherited` are left alone.
    pub fn child_env(&self, inherited: &HashMap<String, String>) -> Vec<(String, String)> {
        [
            ("HOST", self.bind_host.clone()),
            ("PORT", self.bind_port.to_string()),
            ("DATA_DIR", self.data_dir.display().to_string()),
        ]
        .into_iter()
        .filter(|(key, _)| !inherited.contains_key(*key))
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }
}

/// Resolve `RuntimeConfig` from an environment mapping
///
/// # Errors
/// Returns `ConfigError` for the first variable that is present but invalid,
/// or when the probe timeout is not shorter than the probe interval.
pub fn resolve(env: &HashMap<String, String>) -> Result<RuntimeConfig, ConfigError> {
    let lookup = |var: &'static str| non_empty(env, var);

    let bind_host = lookup(ENV_BIND_HOST)?
        .unwrap_or(DEFAULT_BIND_HOST)
        .to_string();

    let bind_port = match lookup(ENV_BIND_PORT)? {
        Some(raw) => parse_port(ENV_BIND_PORT, raw)?,
        None => DEFAULT_BIND_PORT,
    };

    let health_url = match lookup(ENV_HEALTH_URL)? {
        Some(raw) => parse_url(raw)?,
        None => default_health_url(&bind_host, bind_port)?,
    };

    let probe_interval = duration_var(env, ENV_PROBE_INTERVAL, DEFAULT_PROBE_INTERVAL, false)?;
    let probe_timeout = duration_var(env, ENV_PROBE_TIMEOUT, DEFAULT_PROBE_TIMEOUT, false)?;
    let start_period = duration_var(env, ENV_START_PERIOD, DEFAULT_START_PERIOD, true)?;
    let kill_grace = duration_var(env, ENV_KILL_GRACE, DEFAULT_KILL_GRACE, false)?;

    if probe_timeout >= probe_interval {
        return Err(ConfigError::TimeoutNotBelowInterval {
            timeout: probe_timeout,
            interval: probe_interval,
        });
    }

    let failure_threshold = match lookup(ENV_FAILURE_THRESHOLD)? {
        Some(raw) => match raw.parse::<u32>() {
            Ok(0) => return Err(ConfigError::invalid(ENV_FAILURE_THRESHOLD, raw, "must be at least 1")),
            Ok(n) => n,
            Err(e) => return Err(ConfigError::invalid(ENV_FAILURE_THRESHOLD, raw, e.to_string())),
        },
        None => DEFAULT_FAILURE_THRESHOLD,
    };

    let run_as_raw = lookup(ENV_RUN_AS)?.unwrap_or(DEFAULT_RUN_AS);
    let run_as: IdentitySpec = run_as_raw
        .parse()
        .map_err(|reason: String| ConfigError::invalid(ENV_RUN_AS, run_as_raw, reason))?;
    if run_as.is_root() {
        return Err(ConfigError::invalid(
            ENV_RUN_AS,
            run_as_raw,
            "the service must run as a non-root identity",
        ));
    }

    let data_dir = PathBuf::from(lookup(ENV_DATA_DIR)?.unwrap_or(DEFAULT_DATA_DIR));
    if !data_dir.is_absolute() {
        return Err(ConfigError::invalid(
            ENV_DATA_DIR,
            &data_dir.display().to_string(),
            "must be an absolute path",
        ));
    }

    let signal_group = match lookup(ENV_SIGNAL_GROUP)? {
        Some(raw) => parse_bool(ENV_SIGNAL_GROUP, raw)?,
        None => false,
    };

    let status_port = lookup(ENV_STATUS_PORT)?
        .map(|raw| parse_port(ENV_STATUS_PORT, raw))
        .transpose()?;

    // Present-but-empty disables the status file, absent uses the default
    let status_file = match env.get(ENV_STATUS_FILE).map(|v| v.trim()) {
        Some("") => None,
        Some(path) => Some(PathBuf::from(path)),
        None => Some(PathBuf::from(DEFAULT_STATUS_FILE)),
    };

    Ok(RuntimeConfig {
        bind_host,
        bind_port,
        health_url,
        probe_interval,
        probe_timeout,
        start_period,
        failure_threshold,
        run_as,
        data_dir,
        kill_grace,
        signal_group,
        status_port,
        status_file,
    })
}

fn parse_port(var: &'static str, raw: &str) -> Result<u16, ConfigError> {
    match raw.parse::<u16>() {
        Ok(0) => Err(ConfigError::invalid(var, raw, "port must be 1-65535")),
        Ok(port) => Ok(port),
        Err(_) => Err(ConfigError::invalid(var, raw, "port must be 1-65535")),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::invalid(var, raw, "expected true or false")),
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(ENV_HEALTH_URL, raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        "http" | "https" => Err(ConfigError::invalid(ENV_HEALTH_URL, raw, "missing host")),
        other => Err(ConfigError::invalid(
            ENV_HEALTH_URL,
            raw,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

/// Probe the service over loopback unless it binds a specific address
fn default_health_url(bind_host: &str, bind_port: u16) -> Result<Url, ConfigError> {
    let host = match bind_host {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    };
    let raw = if host.contains(':') && !host.starts_with('[') {
        format!("http://[{}]:{}/", host, bind_port)
    } else {
        format!("http://{}:{}/", host, bind_port)
    };
    Url::parse(&raw).map_err(|e| ConfigError::invalid(ENV_BIND_HOST, bind_host, e.to_string()))
}

/// Trimmed value of `var`; `None` when absent, an error when present but empty
fn non_empty<'a>(
    env: &'a HashMap<String, String>,
    var: &'static str,
) -> Result<Option<&'a str>, ConfigError> {
    match env.get(var).map(|v| v.trim()) {
        Some("") => Err(ConfigError::invalid(var, "", "must not be empty")),
        other => Ok(other),
    }
}

fn duration_var(
    env: &HashMap<String, String>,
    var: &'static str,
    default: Duration,
    allow_zero: bool,
) -> Result<Duration, ConfigError> {
    let Some(raw) = non_empty(env, var)? else {
        return Ok(default);
    };
    let duration = parse_duration(raw)
        .ok_or_else(|| ConfigError::invalid(var, raw, "expected a duration like 500ms, 30s, 5m or 1h"))?;
    if duration.is_zero() && !allow_zero {
        return Err(ConfigError::invalid(var, raw, "must be greater than zero"));
    }
    Ok(duration)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
