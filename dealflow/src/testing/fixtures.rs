//! Builders for common test topologies.

use std::sync::Arc;

use super::mocks::MockWorker;
use crate::stage::{StageGraph, StageGraphBuilder, StageId};
use crate::worker::{ArtifactDraft, WorkerRegistry};

/// The seven-stage sequential lifecycle with the given stages gated.
///
/// # Panics
///
/// Never: the sequential lifecycle is always a valid graph.
#[must_use]
pub fn lifecycle_graph(gated: &[StageId]) -> StageGraph {
    let mut builder = StageGraphBuilder::new();
    let mut prev: Option<StageId> = None;
    for id in StageId::ALL {
        let deps: Vec<StageId> = prev.into_iter().collect();
        builder = if gated.contains(&id) {
            builder.gated_stage(id, &deps)
        } else {
            builder.stage(id, &deps)
        }
        .unwrap_or_else(|_| unreachable!("sequential lifecycle is always valid"));
        prev = Some(id);
    }
    builder
        .build()
        .unwrap_or_else(|_| unreachable!("sequential lifecycle is always valid"))
}

/// Mock workers for every lifecycle stage, with handles for assertions.
#[must_use]
pub fn mock_worker_set() -> (WorkerRegistry, Vec<Arc<MockWorker>>) {
    let mut registry = WorkerRegistry::new();
    let mut handles = Vec::new();
    for id in StageId::ALL {
        let worker = Arc::new(MockWorker::new(id));
        handles.push(worker.clone());
        registry = registry.register(worker);
    }
    (registry, handles)
}

/// Shorthand for a draft with a JSON body.
#[must_use]
pub fn draft(body: serde_json::Value) -> ArtifactDraft {
    ArtifactDraft::new(body)
}
