//! One-shot cooperative cancellation.
//!
//! An [`AbortController`] is created per exchange and fired when the
//! outbound connection closes. Handlers observe the paired [`AbortSignal`]
//! (stored in the request extensions) and stop their own work; nothing is
//! force-terminated.

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side of a one-shot abort notification.
#[derive(Debug, Clone)]
pub struct AbortController {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortController {
    /// Create a controller that has not been aborted.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Get a signal observing this controller.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the abort notification.
    ///
    /// Returns `true` only for the call that actually aborted; later calls
    /// are no-ops and return `false`.
    pub fn abort(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Whether the controller has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a one-shot abort notification.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether the paired controller has aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the paired controller aborts.
    ///
    /// Pends forever if the controller is dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}
