//! The evolving shared state of a run.
//!
//! [`DealContext`] is owned by the orchestrator; workers only ever see an
//! immutable [`ContextView`] scoped to their declared dependencies. Commits
//! are write-once per stage and bump the context version, which gives the
//! audit log a total order over state changes.

mod view;

pub use view::ContextView;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::artifact::Artifact;
use crate::errors::ContextError;
use crate::stage::StageId;
use crate::worker::ArtifactDraft;

/// Accumulated shared state: committed artifacts, shared facts and pending
/// revision notes.
#[derive(Debug, Clone, Default)]
pub struct DealContext {
    artifacts: BTreeMap<StageId, Artifact>,
    facts: HashMap<String, serde_json::Value>,
    revision_notes: HashMap<StageId, Vec<String>>,
    version: u64,
    next_seq: u64,
}

impl DealContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a shared fact at construction, e.g. the target company profile.
    ///
    /// Overwrites are allowed here; after the run starts, use
    /// [`Self::put_fact`], which is conflict-checked.
    #[must_use]
    pub fn with_fact(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.facts.insert(key.into(), value);
        self
    }

    /// Current context version; bumped on every commit and note append.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Reserves the next run-wide artifact sequence number.
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Builds an artifact from a worker's draft, consuming a sequence slot.
    pub fn artifact_from_draft(
        &mut self,
        stage: StageId,
        revision: u32,
        draft: ArtifactDraft,
    ) -> Artifact {
        let seq = self.next_seq();
        let mut artifact = Artifact::new(stage, seq, revision, draft.body);
        artifact.summary = draft.summary;
        artifact
    }

    /// Commits an artifact. Write-once: a second commit for the same stage
    /// is a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::DuplicateArtifact`] if the stage already has
    /// a committed artifact.
    pub fn commit(&mut self, artifact: Artifact) -> Result<(), ContextError> {
        let stage = artifact.stage;
        if self.artifacts.contains_key(&stage) {
            return Err(ContextError::DuplicateArtifact { stage });
        }
        self.artifacts.insert(stage, artifact);
        self.version += 1;
        Ok(())
    }

    /// The committed artifact for a stage, if any.
    #[must_use]
    pub fn artifact(&self, stage: StageId) -> Option<&Artifact> {
        self.artifacts.get(&stage)
    }

    /// Whether the stage has a committed artifact.
    #[must_use]
    pub fn is_committed(&self, stage: StageId) -> bool {
        self.artifacts.contains_key(&stage)
    }

    /// The set of committed stages.
    #[must_use]
    pub fn committed_stages(&self) -> BTreeSet<StageId> {
        self.artifacts.keys().copied().collect()
    }

    /// All committed artifacts in stage order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// Adds a shared fact. Facts are append-only.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::FactConflict`] if the key already exists.
    pub fn put_fact(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ContextError> {
        let key = key.into();
        if self.facts.contains_key(&key) {
            return Err(ContextError::FactConflict { key });
        }
        self.facts.insert(key, value);
        self.version += 1;
        Ok(())
    }

    /// Reads a shared fact.
    #[must_use]
    pub fn fact(&self, key: &str) -> Option<&serde_json::Value> {
        self.facts.get(key)
    }

    /// Appends reviewer notes for a stage's next revision attempt.
    pub fn append_revision_notes(&mut self, stage: StageId, notes: impl Into<String>) {
        self.revision_notes.entry(stage).or_default().push(notes.into());
        self.version += 1;
    }

    /// Accumulated revision notes for a stage.
    #[must_use]
    pub fn revision_notes(&self, stage: StageId) -> &[String] {
        self.revision_notes
            .get(&stage)
            .map_or(&[], Vec::as_slice)
    }

    /// Builds the immutable view handed to the worker for `stage`.
    ///
    /// The view exposes only the committed artifacts of `dependencies`,
    /// the shared facts, and any revision notes addressed to `stage`.
    #[must_use]
    pub fn view_for(&self, stage: StageId, dependencies: &BTreeSet<StageId>) -> ContextView {
        let visible: BTreeMap<StageId, Artifact> = dependencies
            .iter()
            .filter_map(|dep| self.artifacts.get(dep).map(|a| (*dep, a.clone())))
            .collect();

        ContextView::new(
            stage,
            dependencies.clone(),
            visible,
            self.facts.clone(),
            self.revision_notes(stage).to_vec(),
            self.version,
        )
    }
}
