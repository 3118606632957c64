//! The supervisor wait loop
//!
//! One multiplexed wait covers incoming signals, descendant exits and the
//! kill deadline. The loop only returns once the primary child has been
//! reaped, so the service never outlives the supervisor as a zombie.
//!
//! Background tasks are stopped as soon as the first termination signal
//! arrives, not when the service is finally reaped: a service draining for
//! the whole grace period must not keep being probed.

use super::{
    is_termination_signal, ChildExit, LaunchError, LaunchSpec, ProcessControl, ProcessStatus,
    StateChange, SupervisedProcess,
};
use crate::privilege::Identity;
use crate::server::{SharedMetrics, ShutdownController};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct InitSupervisor<P: ProcessControl> {
    control: P,
    kill_grace: Duration,
    metrics: Option<SharedMetrics>,
    shutdown: Option<ShutdownController>,
}

enum Wake {
    Change(StateChange),
    GraceExpired,
}

impl<P: ProcessControl> InitSupervisor<P> {
    pub fn new(control: P, kill_grace: Duration) -> Self {
        Self {
            control,
            kill_grace,
            metrics: None,
            shutdown: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Trigger `shutdown` on the first termination signal, and after the service exits
    pub fn with_shutdown(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn control(&self) -> &P {
        &self.control
    }

    /// Launch the service described by `spec`
    pub fn launch(&mut self, spec: &LaunchSpec) -> Result<SupervisedProcess, LaunchError> {
        let pid = self.control.launch(spec)?;
        let owner = spec.identity.clone().unwrap_or_else(Identity::current);
        let command_line = spec.command_line();

        info!(
            pid = %pid,
            command = ?command_line,
            owner = %owner,
            "Service launched"
        );

        Ok(SupervisedProcess {
            pid,
            command_line,
            owner,
            status: ProcessStatus::Running,
        })
    }

    /// Relay signals and reap descendants until `process` exits
    ///
    /// Returns the exit code to mirror. A termination signal arms a kill
    /// deadline of `kill_grace`; later termination signals are still
    /// forwarded but never move that deadline.
    pub async fn supervise(&mut self, process: &mut SupervisedProcess) -> i32 {
        let mut kill_deadline: Option<Instant> = None;
        let mut escalated = false;

        let code = loop {
            let wake = match kill_deadline {
                Some(deadline) => tokio::select! {
                    change = self.control.wait_for_child_state_change() => Wake::Change(change),
                    _ = tokio::time::sleep_until(deadline) => Wake::GraceExpired,
                },
                None => Wake::Change(self.control.wait_for_child_state_change().await),
            };

            match wake {
                Wake::GraceExpired => {
                    warn!(
                        pid = %process.pid,
                        grace = ?self.kill_grace,
                        "Service did not exit within grace period, sending SIGKILL"
                    );
                    self.forward(process.pid, Signal::SIGKILL);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_kill_escalation();
                    }
                    kill_deadline = None;
                    escalated = true;
                }
                Wake::Change(StateChange::Signal(signal)) => {
                    info!(signal = %signal, pid = %process.pid, "Forwarding signal to service");
                    self.forward(process.pid, signal);
                    if is_termination_signal(signal) && kill_deadline.is_none() && !escalated {
                        kill_deadline = Some(Instant::now() + self.kill_grace);
                        self.stop_background_tasks();
                    }
                }
                Wake::Change(StateChange::ChildrenExited(exits)) => {
                    if let Some(code) = self.absorb(process, exits) {
                        break code;
                    }
                }
            }
        };

        // Descendants that exited alongside the service
        let stragglers = self.control.reap_orphans();
        self.absorb(process, stragglers);

        info!(pid = %process.pid, status = %process.status, exit_code = code, "Service exited");
        self.stop_background_tasks();
        code
    }

    /// Launch and supervise; the launch error is returned before any wait
    pub async fn run(&mut self, spec: &LaunchSpec) -> Result<i32, LaunchError> {
        let mut process = self.launch(spec)?;
        Ok(self.supervise(&mut process).await)
    }

    fn forward(&self, pid: Pid, signal: Signal) {
        match self.control.forward_signal(pid, signal) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_signal_forwarded(signal.as_str());
                }
            }
            Err(e) => warn!(error = %e, "Failed to forward signal"),
        }
    }

    fn stop_background_tasks(&self) {
        if let Some(shutdown) = &self.shutdown {
            shutdown.shutdown();
        }
    }

    /// Fold reaped descendants into `process`; returns its exit code once it has exited
    fn absorb(&self, process: &mut SupervisedProcess, exits: Vec<ChildExit>) -> Option<i32> {
        let mut orphans = 0;
        for exit in exits {
            if exit.pid == process.pid {
                process.status = exit.status;
            } else {
                orphans += 1;
                debug!(pid = %exit.pid, status = %exit.status, "Reaped orphan");
            }
        }
        if orphans > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.record_orphans_reaped(orphans);
            }
        }
        process.status.exit_code()
    }
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests;
