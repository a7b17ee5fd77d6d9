//! Read-only context views handed to workers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::artifact::Artifact;
use crate::errors::ContextError;
use crate::stage::StageId;

/// An immutable snapshot of the context, scoped to one stage's declared
/// dependencies.
///
/// Views are built under the orchestrator's context lock and then moved into
/// the worker task, so a worker can never observe a commit that happened
/// after its stage was admitted to the ready set.
#[derive(Debug, Clone)]
pub struct ContextView {
    stage: StageId,
    declared: BTreeSet<StageId>,
    artifacts: BTreeMap<StageId, Artifact>,
    facts: HashMap<String, serde_json::Value>,
    revision_notes: Vec<String>,
    context_version: u64,
}

impl ContextView {
    pub(crate) fn new(
        stage: StageId,
        declared: BTreeSet<StageId>,
        artifacts: BTreeMap<StageId, Artifact>,
        facts: HashMap<String, serde_json::Value>,
        revision_notes: Vec<String>,
        context_version: u64,
    ) -> Self {
        Self {
            stage,
            declared,
            artifacts,
            facts,
            revision_notes,
            context_version,
        }
    }

    /// The stage this view was built for.
    #[must_use]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// The context version the view was snapshotted at.
    #[must_use]
    pub fn context_version(&self) -> u64 {
        self.context_version
    }

    /// The artifact of a declared dependency.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::UndeclaredDependency`] if `dep` was not
    /// declared by this stage — committed or not, undeclared stages are
    /// invisible by contract.
    pub fn dependency(&self, dep: StageId) -> Result<&Artifact, ContextError> {
        if !self.declared.contains(&dep) {
            return Err(ContextError::UndeclaredDependency {
                stage: self.stage,
                dependency: dep,
            });
        }
        self.artifacts.get(&dep).ok_or(ContextError::UndeclaredDependency {
            stage: self.stage,
            dependency: dep,
        })
    }

    /// All visible dependency artifacts in stage order.
    pub fn dependency_artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// Reads a shared fact.
    #[must_use]
    pub fn fact(&self, key: &str) -> Option<&serde_json::Value> {
        self.facts.get(key)
    }

    /// Reviewer notes addressed to this stage, oldest first. Empty on the
    /// first attempt.
    #[must_use]
    pub fn revision_notes(&self) -> &[String] {
        &self.revision_notes
    }

    /// True when the view belongs to a revision attempt.
    #[must_use]
    pub fn is_revision(&self) -> bool {
        !self.revision_notes.is_empty()
    }
}
