//! Cooperative cancellation.
//!
//! The token is cheap to clone and shared between the orchestrator, the
//! tool gateway and the checkpoint gate, so an operator abort reaches every
//! suspension point. Cancellation is idempotent: the first reason wins.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    tx: watch::Sender<bool>,
}

/// A token for cooperative cancellation, awaitable from async tasks.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
    rx: watch::Receiver<bool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason: RwLock::new(None),
                tx,
            }),
            rx,
        }
    }

    /// Requests cancellation. Idempotent: only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.inner.reason.write() = Some(reason.into());
            let _ = self.inner.tx.send(true);
        }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// The reason, or a fallback for tokens cancelled without one.
    #[must_use]
    pub fn reason_or_default(&self) -> String {
        self.reason().unwrap_or_else(|| "cancelled".to_string())
    }

    /// Resolves once cancellation is requested. Safe to call from any
    /// number of tasks; completes immediately if already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives inside Inner, so this arm is unreachable
                // while any token clone exists.
                return;
            }
        }
    }
}
