//! Shutdown fan-out for vigil's background tasks
//!
//! The supervisor owns the process signals. It triggers shutdown here on the
//! first termination signal, or once the service has exited, which stops:
//! - the health monitor (including a probe in flight)
//! - the status endpoint

use tokio::sync::watch;
use tracing::info;

/// Receiving end, cloned into every task that must stop with the service
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolve once shutdown is triggered or the controller is dropped
    pub async fn wait(&mut self) {
        // Err means the controller is gone, which is shutdown too
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Sending end, handed to the supervisor
pub struct ShutdownController(watch::Sender<bool>);

impl ShutdownController {
    /// Stop all tasks holding a `ShutdownSignal`; repeated calls are no-ops
    pub fn shutdown(&self) {
        if !self.0.send_replace(true) {
            info!(tasks = self.0.receiver_count(), "Stopping background tasks");
        }
    }
}

pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController(sender), ShutdownSignal(receiver))
}
