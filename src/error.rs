//! Startup failures and the exit codes they map to
//!
//! Everything here happens before the service exists; once it is running
//! the supervisor's exit code is the service's own.

use crate::config::ConfigError;
use crate::privilege::PermissionError;
use crate::supervisor::{LaunchError, SupervisorError};
use thiserror::Error;

/// `EX_USAGE` from sysexits.h
pub const EXIT_USAGE: i32 = 64;
/// `EX_SOFTWARE`
pub const EXIT_SOFTWARE: i32 = 70;
/// `EX_OSERR`
pub const EXIT_OS_ERROR: i32 = 71;
/// `EX_NOPERM`
pub const EXIT_NO_PERMISSION: i32 = 77;
/// `EX_CONFIG`
pub const EXIT_CONFIG: i32 = 78;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No command given. Usage: vigil [--] <command> [args...]")]
    Usage,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to prepare service identity: {0}")]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Supervisor setup failed: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Failed to create metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to build probe HTTP client: {0}")]
    Probe(#[from] reqwest::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Usage => EXIT_USAGE,
            StartupError::Config(_) => EXIT_CONFIG,
            StartupError::Permission(_) => EXIT_NO_PERMISSION,
            StartupError::Launch(e) => e.exit_code(),
            StartupError::Supervisor(_) => EXIT_OS_ERROR,
            StartupError::Metrics(_) => EXIT_SOFTWARE,
            StartupError::Probe(_) => EXIT_SOFTWARE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_exit_codes_are_distinct_from_each_other() {
        let config = StartupError::from(ConfigError::Invalid {
            var: "VIGIL_BIND_PORT",
            value: "0".to_string(),
            reason: "out of range".to_string(),
        });
        let permission = StartupError::from(PermissionError::RootIdentity("root".to_string()));
        let missing = StartupError::from(LaunchError::from_io(
            "web",
            io::Error::from(io::ErrorKind::NotFound),
        ));
        let denied = StartupError::from(LaunchError::from_io(
            "web",
            io::Error::from(io::ErrorKind::PermissionDenied),
        ));

        assert_eq!(StartupError::Usage.exit_code(), 64);
        assert_eq!(config.exit_code(), 78);
        assert_eq!(permission.exit_code(), 77);
        assert_eq!(missing.exit_code(), 127);
        assert_eq!(denied.exit_code(), 126);
    }

    #[test]
    fn test_http_client_failure_is_internal_error() {
        // Any reqwest::Error will do; a builder error is the easiest to provoke
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("relative URL is rejected");

        let startup = StartupError::from(err);

        assert_eq!(startup.exit_code(), 70);
        assert!(startup.to_string().starts_with("Failed to build probe HTTP client"));
    }

    #[test]
    fn test_launch_error_message_names_program() {
        let err = StartupError::from(LaunchError::from_io(
            "gunicorn",
            io::Error::from(io::ErrorKind::NotFound),
        ));

        assert_eq!(err.to_string(), "Command not found: gunicorn");
    }
}
