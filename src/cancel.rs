//! Cooperative cancellation carried into every waiting operation.
//!
//! A scoped stand-in for a cancellation context: cheap to clone, observable
//! from any number of tasks, and usable both as a flag check and as a
//! future to race against (`cancelled()`).

use tokio::sync::watch;

/// A cooperative cancellation signal. Clones share the same underlying
/// state; calling [`CancellationToken::cancel`] on any clone cancels all of
/// them.
#[derive(Clone)]
pub struct CancellationToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Signals cancellation to every holder of this token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been signalled. Intended to be raced
    /// against other futures (channel recv, backoff sleep, network call)
    /// with `tokio::select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
