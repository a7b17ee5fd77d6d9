//! Immutable stage artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stage::StageId;

/// The immutable output of a completed stage.
///
/// Artifacts are created by the orchestrator from a worker's draft and never
/// modified afterwards. The sequence number is run-wide and monotonic; gaps
/// mark candidates that were discarded at a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// The stage that produced the artifact.
    pub stage: StageId,
    /// Run-wide monotonic sequence number, assigned at creation.
    pub seq: u64,
    /// Zero-based revision: 0 for the first attempt, incremented per revise.
    pub revision: u32,
    /// The structured result body.
    pub body: serde_json::Value,
    /// One-line description for reviewers and logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Creation timestamp.
    pub produced_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates an artifact.
    #[must_use]
    pub fn new(stage: StageId, seq: u64, revision: u32, body: serde_json::Value) -> Self {
        Self {
            stage,
            seq,
            revision,
            body,
            summary: None,
            produced_at: Utc::now(),
        }
    }

    /// Sets the reviewer-facing summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Content equality: same stage, revision and body.
    ///
    /// Sequence numbers and timestamps vary between otherwise identical
    /// runs, so idempotence checks compare through this instead of `==`.
    #[must_use]
    pub fn content_eq(&self, other: &Self) -> bool {
        self.stage == other.stage && self.revision == other.revision && self.body == other.body
    }
}
