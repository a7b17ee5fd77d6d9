//! The worker capability and the stage-to-worker registry.
//!
//! A worker is the unit of reasoning bound to one stage: it consumes a
//! [`ContextView`], may call tools through the gateway it was constructed
//! with, and returns a draft. It never touches shared state — only the
//! orchestrator commits. Workers must be idempotent for identical views so
//! revise-driven re-runs are safe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::context::ContextView;
use crate::errors::{GraphValidationError, WorkerError};
use crate::stage::{StageGraph, StageId};

/// The uncommitted result a worker hands back to the orchestrator.
///
/// The orchestrator turns a draft into an [`Artifact`](crate::artifact::Artifact)
/// by assigning the run-wide sequence number and revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    /// The structured result body.
    pub body: serde_json::Value,
    /// One-line description for reviewers and logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ArtifactDraft {
    /// Creates a draft from a body.
    #[must_use]
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            summary: None,
        }
    }

    /// Sets the reviewer-facing summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// The polymorphic stage capability.
///
/// One implementation per lifecycle phase; the orchestrator depends only on
/// this trait, so new phases slot in without touching scheduling logic.
#[async_trait]
pub trait Worker: Send + Sync + Debug {
    /// The stage this worker is bound to.
    fn stage(&self) -> StageId;

    /// Produces the stage's draft from the visible context.
    ///
    /// Revision notes, when present, ride inside the view
    /// ([`ContextView::revision_notes`]).
    ///
    /// # Errors
    ///
    /// Any unrecovered failure, surfaced to the orchestrator as a stage
    /// failure. Transient tool errors are the gateway's business, not the
    /// worker's.
    async fn execute(&self, view: &ContextView) -> Result<ArtifactDraft, WorkerError>;
}

/// A closure-backed worker, mostly for wiring and tests.
pub struct FnWorker<F>
where
    F: Fn(&ContextView) -> Result<ArtifactDraft, WorkerError> + Send + Sync,
{
    stage: StageId,
    func: F,
}

impl<F> FnWorker<F>
where
    F: Fn(&ContextView) -> Result<ArtifactDraft, WorkerError> + Send + Sync,
{
    /// Creates a worker from a closure.
    pub fn new(stage: StageId, func: F) -> Self {
        Self { stage, func }
    }
}

impl<F> Debug for FnWorker<F>
where
    F: Fn(&ContextView) -> Result<ArtifactDraft, WorkerError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWorker").field("stage", &self.stage).finish()
    }
}

#[async_trait]
impl<F> Worker for FnWorker<F>
where
    F: Fn(&ContextView) -> Result<ArtifactDraft, WorkerError> + Send + Sync,
{
    fn stage(&self) -> StageId {
        self.stage
    }

    async fn execute(&self, view: &ContextView) -> Result<ArtifactDraft, WorkerError> {
        (self.func)(view)
    }
}

/// Static registry mapping each stage to its worker.
///
/// Built once before a run; [`Self::validate_for`] ensures every graph
/// stage is covered so a missing binding fails at construction, not
/// mid-run.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<StageId, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker under its own stage. Last registration wins.
    #[must_use]
    pub fn register(mut self, worker: Arc<dyn Worker>) -> Self {
        self.workers.insert(worker.stage(), worker);
        self
    }

    /// The worker bound to a stage.
    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<Arc<dyn Worker>> {
        self.workers.get(&stage).cloned()
    }

    /// Number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True when no workers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Checks that every stage in the graph has a worker.
    ///
    /// # Errors
    ///
    /// Returns [`GraphValidationError::MissingWorker`] naming the first
    /// uncovered stage in priority order.
    pub fn validate_for(&self, graph: &StageGraph) -> Result<(), GraphValidationError> {
        for id in graph.priority_order() {
            if !self.workers.contains_key(id) {
                return Err(GraphValidationError::MissingWorker { stage: *id });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn empty_view(stage: StageId) -> ContextView {
        ContextView::new(
            stage,
            BTreeSet::new(),
            BTreeMap::new(),
            HashMap::new(),
            Vec::new(),
            0,
        )
    }

    #[tokio::test]
    async fn test_fn_worker_executes_closure() {
        let worker = FnWorker::new(StageId::Strategy, |_view| {
            Ok(ArtifactDraft::new(serde_json::json!({"thesis": "rollup"})))
        });

        assert_eq!(worker.stage(), StageId::Strategy);
        let draft = worker.execute(&empty_view(StageId::Strategy)).await.unwrap();
        assert_eq!(draft.body, serde_json::json!({"thesis": "rollup"}));
    }

    #[tokio::test]
    async fn test_fn_worker_surfaces_errors() {
        let worker = FnWorker::new(StageId::Valuation, |view| {
            Err(WorkerError::msg(view.stage(), "no comparables"))
        });

        let err = worker.execute(&empty_view(StageId::Valuation)).await.unwrap_err();
        assert_eq!(err.stage, StageId::Valuation);
    }

    #[test]
    fn test_registry_validation_reports_missing_worker() {
        let graph = StageGraph::sequential_lifecycle();
        let mut registry = WorkerRegistry::new();
        for id in StageId::ALL {
            if id == StageId::Negotiation {
                continue;
            }
            registry = registry.register(Arc::new(FnWorker::new(id, |_| {
                Ok(ArtifactDraft::new(serde_json::json!({})))
            })));
        }

        let err = registry.validate_for(&graph).unwrap_err();
        assert_eq!(
            err,
            GraphValidationError::MissingWorker {
                stage: StageId::Negotiation
            }
        );
    }

    #[test]
    fn test_registry_full_coverage_passes() {
        let graph = StageGraph::sequential_lifecycle();
        let mut registry = WorkerRegistry::new();
        for id in StageId::ALL {
            registry = registry.register(Arc::new(FnWorker::new(id, |_| {
                Ok(ArtifactDraft::new(serde_json::json!({})))
            })));
        }
        assert!(registry.validate_for(&graph).is_ok());
        assert_eq!(registry.len(), 7);
    }
}
