//! Cooperative cancellation for background stream tasks.
//!
//! A [`Canceller`] belongs to the owning scope; every task it spawns
//! carries a [`CancelToken`] and selects on [`CancelToken::cancelled`] at
//! each suspension point. Dropping the `Canceller` cancels all outstanding
//! tokens, so producers cannot outlive their owner past the next await.
//!
//! # Example
//!
//! ```ignore
//! let canceller = Canceller::new();
//! let token = canceller.token();
//!
//! tokio::spawn(async move {
//!     tokio::select! {
//!         _ = token.cancelled() => {}
//!         _ = run_pipeline() => {}
//!     }
//! });
//!
//! canceller.cancel();
//! ```

use tokio::sync::watch;
use tracing::debug;

/// Owner side of a cancel scope.
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Derive a token for one task.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal cancellation to every outstanding token.
    pub fn cancel(&self) {
        let already_cancelled = self.tx.send_replace(true);
        if !already_cancelled {
            debug!("cancel scope triggered");
        }
    }

    /// Whether this scope has already been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Canceller {
    fn drop(&mut self) {
        // The flag flips before the channel closes, so tokens polled after
        // the owner is gone still read as cancelled.
        self.tx.send_replace(true);
    }
}

/// Task side of a cancel scope. Cheap to clone.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Whether the owning scope has cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the owning scope cancels, immediately if it already
    /// has.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // A closed channel means the owner is gone, which counts too.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
