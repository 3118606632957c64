//! Unix process control: tokio signal streams plus `waitpid`/`kill`
//!
//! All handlers are registered in `UnixProcessControl::new`, before the
//! service is launched, so no signal sent right after launch is lost.
//! SIGCHLD is not forwarded; it triggers a non-blocking reap of every
//! exited descendant instead.

use super::{
    ChildExit, LaunchError, LaunchSpec, ProcessControl, ProcessStatus, StateChange,
    SupervisorError, FORWARDED_SIGNALS, TERMINATION_SIGNALS,
};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

pub struct UnixProcessControl {
    streams: Vec<(Signal, tokio::signal::unix::Signal)>,
    signal_group: bool,
}

impl UnixProcessControl {
    /// Register handlers for every supervised signal
    ///
    /// With `signal_group`, the service gets its own process group and
    /// signals go to the whole group.
    pub fn new(signal_group: bool) -> Result<Self, SupervisorError> {
        let mut streams = Vec::new();
        for sig in TERMINATION_SIGNALS
            .iter()
            .chain(FORWARDED_SIGNALS.iter())
            .chain(std::iter::once(&Signal::SIGCHLD))
        {
            let stream = signal(SignalKind::from_raw(*sig as i32)).map_err(|source| {
                SupervisorError::SignalRegistration {
                    signal: sig.as_str(),
                    source,
                }
            })?;
            streams.push((*sig, stream));
        }
        Ok(Self {
            streams,
            signal_group,
        })
    }
}

#[async_trait]
impl ProcessControl for UnixProcessControl {
    fn launch(&mut self, spec: &LaunchSpec) -> Result<Pid, LaunchError> {
        let mut command = std::process::Command::new(&spec.program);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if let Some(identity) = &spec.identity {
            // std clears supplementary groups when switching away from root
            command.uid(identity.uid.as_raw()).gid(identity.gid.as_raw());
        }
        if self.signal_group {
            command.process_group(0);
        }

        // Dropping the std handle neither waits nor kills; reaping happens
        // through waitpid(-1) in reap_orphans.
        let child = command
            .spawn()
            .map_err(|source| LaunchError::from_io(&spec.program, source))?;
        Ok(Pid::from_raw(child.id() as i32))
    }

    fn forward_signal(&self, pid: Pid, signal: Signal) -> Result<(), SupervisorError> {
        let target = if self.signal_group {
            Pid::from_raw(-pid.as_raw())
        } else {
            pid
        };
        match kill(target, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(SupervisorError::Forward {
                pid,
                signal,
                source,
            }),
        }
    }

    async fn wait_for_child_state_change(&mut self) -> StateChange {
        let waits = self.streams.iter_mut().map(|(sig, stream)| {
            let sig = *sig;
            Box::pin(async move {
                match stream.recv().await {
                    Some(()) => sig,
                    // Driver gone: this stream never fires again
                    None => std::future::pending::<Signal>().await,
                }
            })
        });
        let (received, _, _) = futures::future::select_all(waits).await;

        if received == Signal::SIGCHLD {
            StateChange::ChildrenExited(self.reap_orphans())
        } else {
            StateChange::Signal(received)
        }
    }

    fn reap_orphans(&mut self) -> Vec<ChildExit> {
        let mut exits = Vec::new();
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => exits.push(ChildExit {
                    pid,
                    status: ProcessStatus::Exited(code),
                }),
                Ok(WaitStatus::Signaled(pid, signal, _)) => exits.push(ChildExit {
                    pid,
                    status: ProcessStatus::Signaled(signal),
                }),
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(other) => debug!(status = ?other, "Ignoring non-exit wait status"),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!(error = %e, "waitpid failed");
                    break;
                }
            }
        }
        exits
    }
}

/// Adopt orphaned descendants when not running as PID 1
///
/// PID 1 inherits orphans from the kernel; anywhere else the supervisor must
/// ask for them with `PR_SET_CHILD_SUBREAPER`.
#[cfg(target_os = "linux")]
pub fn enable_subreaper() {
    if nix::unistd::getpid().as_raw() == 1 {
        return;
    }
    match nix::sys::prctl::set_child_subreaper(true) {
        Ok(()) => debug!("Registered as child subreaper"),
        Err(e) => warn!(error = %e, "Failed to register as child subreaper; orphans go to the host init"),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn enable_subreaper() {}
