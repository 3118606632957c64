//! PID 1 supervision of the service process
//!
//! `InitSupervisor` launches the service, relays signals to it, reaps every
//! exited descendant and finally mirrors the service's exit status as its
//! own. The platform primitives sit behind `ProcessControl`:
//! - `UnixProcessControl` for production (tokio signal streams + waitpid)
//! - scripted implementations in tests

mod init;
mod unix;

pub use init::InitSupervisor;
pub use unix::{enable_subreaper, UnixProcessControl};

use crate::privilege::Identity;
use async_trait::async_trait;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fmt;
use thiserror::Error;

/// Signals that start a graceful shutdown of the service
pub const TERMINATION_SIGNALS: [Signal; 3] = [Signal::SIGTERM, Signal::SIGINT, Signal::SIGQUIT];

/// Signals relayed to the service without starting a shutdown
pub const FORWARDED_SIGNALS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGWINCH,
];

pub fn is_termination_signal(signal: Signal) -> bool {
    TERMINATION_SIGNALS.contains(&signal)
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Command not found: {program}")]
    NotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    pub fn from_io(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            LaunchError::NotFound {
                program: program.to_string(),
                source,
            }
        } else {
            LaunchError::Spawn {
                program: program.to_string(),
                source,
            }
        }
    }

    /// Shell convention: 127 for a missing command, 126 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::NotFound { .. } => 127,
            LaunchError::Spawn { .. } => 126,
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to register {signal} handler: {source}")]
    SignalRegistration {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send {signal} to {pid}: {source}")]
    Forward {
        pid: Pid,
        signal: Signal,
        #[source]
        source: nix::Error,
    },
}

/// Lifecycle status of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(i32),
    Signaled(Signal),
}

impl ProcessStatus {
    /// Exit code to mirror: the code itself, or 128 + signal number
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessStatus::Running => None,
            ProcessStatus::Exited(code) => Some(*code),
            ProcessStatus::Signaled(signal) => Some(128 + *signal as i32),
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited(code) => write!(f, "exited with code {}", code),
            ProcessStatus::Signaled(signal) => write!(f, "killed by {}", signal),
        }
    }
}

/// A reaped descendant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub pid: Pid,
    pub status: ProcessStatus,
}

/// What woke the supervisor's wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// A registered signal arrived (never SIGCHLD)
    Signal(Signal),
    /// Descendants were reaped; may be empty on a spurious SIGCHLD
    ChildrenExited(Vec<ChildExit>),
}

/// What to launch and as whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Identity to switch to; `None` keeps the supervisor's own
    pub identity: Option<Identity>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            identity: None,
            env: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// The service process, owned and mutated only by `InitSupervisor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisedProcess {
    pub pid: Pid,
    pub command_line: Vec<String>,
    pub owner: Identity,
    pub status: ProcessStatus,
}

/// Platform primitives the supervisor is built on
#[async_trait]
pub trait ProcessControl: Send {
    /// Start the service process and return its pid
    fn launch(&mut self, spec: &LaunchSpec) -> Result<Pid, LaunchError>;

    /// Deliver `signal` to `pid`; a process that is already gone is not an error
    fn forward_signal(&self, pid: Pid, signal: Signal) -> Result<(), SupervisorError>;

    /// Block until a registered signal arrives or descendants exit
    async fn wait_for_child_state_change(&mut self) -> StateChange;

    /// Reap every descendant that has already exited, without blocking
    fn reap_orphans(&mut self) -> Vec<ChildExit>;
}
