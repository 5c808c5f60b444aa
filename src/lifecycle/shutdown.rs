//! Shutdown coordination.
//!
//! The flag is sticky: a listener that subscribes after the trigger still
//! stops immediately.

use tokio::sync::watch;

/// Coordinator for graceful shutdown of the gateway and relay listeners.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a signal for one listener.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal(self.tx.subscribe())
    }

    /// Trigger the shutdown signal. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!(listeners = self.tx.receiver_count(), "Shutdown triggered");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half held by a listener.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolve once shutdown is triggered or the coordinator is gone.
    pub async fn recv(mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}
