//! The checkpoint gate: submission, notification, exactly-once resolution.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CheckpointDecision, CheckpointRequest};
use crate::cancellation::CancellationToken;
use crate::errors::CheckpointError;

/// The reviewer-facing side of a checkpoint.
///
/// The gate calls `notify` when a request becomes pending; the external
/// reviewer answers later through [`CheckpointGate::resolve`]. How the
/// request reaches a human (queue, webhook, terminal prompt) is the
/// implementer's business.
#[async_trait]
pub trait ReviewerChannel: Send + Sync {
    /// Announces a newly pending request.
    async fn notify(&self, request: &CheckpointRequest);
}

/// A reviewer channel that announces nothing.
///
/// Useful when decisions are driven directly against the gate, e.g. from
/// tests or an embedding application with its own dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReviewerChannel;

#[async_trait]
impl ReviewerChannel for NullReviewerChannel {
    async fn notify(&self, _request: &CheckpointRequest) {}
}

/// Blocks gated stages until a human decision arrives.
///
/// Each submitted request is resolved exactly once: the first call to
/// [`Self::resolve`] wins, later calls return `false`. Waiters suspend on a
/// oneshot channel — no polling — bounded by the configured timeout and the
/// run's cancellation token.
pub struct CheckpointGate {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<CheckpointDecision>>>,
    reviewer: Arc<dyn ReviewerChannel>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl CheckpointGate {
    /// Creates a gate with a 30s decision window and no reviewer channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            reviewer: Arc::new(NullReviewerChannel),
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the reviewer channel.
    #[must_use]
    pub fn with_reviewer(mut self, reviewer: Arc<dyn ReviewerChannel>) -> Self {
        self.reviewer = reviewer;
        self
    }

    /// Sets the decision window.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shares a cancellation token; pending waits abort when it fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Submits a request and suspends until it is resolved.
    ///
    /// # Errors
    ///
    /// - [`CheckpointError::TimedOut`] if no decision arrives in time.
    /// - [`CheckpointError::Cancelled`] if the run is aborted while
    ///   pending.
    pub async fn submit(
        &self,
        request: CheckpointRequest,
    ) -> Result<CheckpointDecision, CheckpointError> {
        let stage = request.stage;
        let id = request.id;
        let (tx, rx) = oneshot::channel();

        self.pending.lock().insert(id, tx);
        debug!(%id, stage = %stage, "checkpoint pending");

        // Notify outside the lock; a reviewer may resolve synchronously.
        self.reviewer.notify(&request).await;

        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(CheckpointError::Cancelled { stage }),
            decided = tokio::time::timeout(self.timeout, rx) => match decided {
                Ok(Ok(decision)) => Ok(decision),
                Ok(Err(_closed)) => Err(CheckpointError::Closed { stage }),
                Err(_elapsed) => Err(CheckpointError::TimedOut {
                    stage,
                    timeout: self.timeout,
                }),
            },
        };

        // Drop the sender slot whichever way the wait ended, so a late
        // resolve cannot find a stale entry.
        self.pending.lock().remove(&id);

        if let Err(err) = &outcome {
            warn!(%id, stage = %stage, error = %err, "checkpoint did not resolve");
        }
        outcome
    }

    /// Delivers a decision for a pending request.
    ///
    /// Returns `true` if the request was pending and is now resolved;
    /// `false` for unknown ids and for requests already resolved, timed
    /// out or cancelled.
    pub fn resolve(&self, id: Uuid, decision: CheckpointDecision) -> bool {
        let sender = self.pending.lock().remove(&id);
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Ids of requests currently awaiting a decision.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<Uuid> {
        self.pending.lock().keys().copied().collect()
    }

    /// Number of requests currently awaiting a decision.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for CheckpointGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CheckpointGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointGate")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout)
            .finish()
    }
}
