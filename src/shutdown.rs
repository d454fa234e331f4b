//! Process-wide shutdown signal
//!
//! One [`Shutdown`] is created by the daemon; every loop gets its own
//! [`ShutdownListener`] and checks it at its natural suspension points.

use std::sync::Arc;

use tokio::sync::watch;

/// Trigger side of the shutdown signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Ask every listener to stop
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("shutdown requested");
        }
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a listener for one loop
    #[must_use]
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side held by a single loop
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown is requested
    ///
    /// Also resolves if the trigger side is gone, since nothing could ever
    /// stop the loop otherwise.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Whether shutdown has been requested
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
