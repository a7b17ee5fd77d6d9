//! Human checkpoints.
//!
//! A gated stage's candidate artifact is held at the gate until a reviewer
//! decides: approve it, send it back with notes, or reject it. The gate
//! turns "wait for a person" into a first-class operation with a timeout
//! and cancellation, so a silent reviewer can never stall a run forever.

mod gate;

pub use gate::{CheckpointGate, NullReviewerChannel, ReviewerChannel};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::stage::StageId;

/// A reviewer's verdict on a candidate artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CheckpointDecision {
    /// Commit the artifact and continue.
    Approved,
    /// Send the stage back for another attempt with these notes.
    Revise {
        /// Reviewer guidance folded into the stage's next view.
        notes: String,
    },
    /// Terminate the run.
    Rejected,
}

impl CheckpointDecision {
    /// Creates a revise decision.
    #[must_use]
    pub fn revise(notes: impl Into<String>) -> Self {
        Self::Revise {
            notes: notes.into(),
        }
    }
}

/// A pending approval request for one gated stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRequest {
    /// Unique request id; the handle reviewers resolve against.
    pub id: Uuid,
    /// The gated stage.
    pub stage: StageId,
    /// The candidate artifact awaiting the decision.
    pub artifact: Artifact,
    /// When the request was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl CheckpointRequest {
    /// Creates a request for a candidate artifact.
    #[must_use]
    pub fn new(stage: StageId, artifact: Artifact) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            artifact,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&CheckpointDecision::revise("add synergies")).unwrap();
        assert!(json.contains("\"decision\":\"revise\""));
        assert!(json.contains("add synergies"));

        let back: CheckpointDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CheckpointDecision::revise("add synergies"));
    }

    #[test]
    fn test_request_carries_candidate() {
        let artifact = Artifact::new(
            StageId::DueDiligence,
            5,
            0,
            serde_json::json!({"findings": []}),
        );
        let request = CheckpointRequest::new(StageId::DueDiligence, artifact);

        assert_eq!(request.stage, StageId::DueDiligence);
        assert_eq!(request.artifact.seq, 5);
    }
}
