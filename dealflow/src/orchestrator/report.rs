//! Run states and the final run report.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::context::DealContext;
use crate::errors::DealflowError;
use crate::events::RunEvent;
use crate::stage::StageId;

/// Overall pipeline status. One per run; transitions are driven solely by
/// the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed, not yet running.
    Initializing,
    /// Stages are being scheduled and executed.
    Running,
    /// Blocked on a human checkpoint decision.
    SuspendedAtCheckpoint,
    /// Every stage committed.
    Completed,
    /// The run halted on a failure.
    Failed,
}

impl RunState {
    /// True for the two terminal states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::SuspendedAtCheckpoint => "suspended_at_checkpoint",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything a run hands to the persistence/reporting boundary: final
/// state, the (possibly partial) context, the failure if any, and the
/// structured audit log.
#[derive(Debug)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Terminal state: `Completed` or `Failed`.
    pub state: RunState,
    /// The accumulated context at the end of the run.
    pub context: DealContext,
    /// The halting failure, for failed runs.
    pub failure: Option<DealflowError>,
    /// The full event sequence, in emission order.
    pub events: Vec<RunEvent>,
}

impl RunReport {
    /// True when every stage committed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// The machine-readable failure kind, for failed runs.
    #[must_use]
    pub fn failure_kind(&self) -> Option<&'static str> {
        self.failure.as_ref().map(DealflowError::kind)
    }

    /// The stage the failure originated from, when known.
    #[must_use]
    pub fn failing_stage(&self) -> Option<StageId> {
        self.failure.as_ref().and_then(DealflowError::stage)
    }

    /// A one-paragraph human-readable outcome: state, failing stage and
    /// error for failures, commit count either way.
    #[must_use]
    pub fn summary(&self) -> String {
        let committed = self.context.committed_stages().len();
        match &self.failure {
            None => format!("run {}: {} ({committed} stages committed)", self.run_id, self.state),
            Some(err) => {
                let stage = err
                    .stage()
                    .map_or_else(String::new, |s| format!(" at stage '{s}'"));
                format!(
                    "run {}: {}{stage} [{}]: {err} ({committed} stages committed)",
                    self.run_id,
                    self.state,
                    err.kind(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CheckpointError;

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::SuspendedAtCheckpoint.to_string(), "suspended_at_checkpoint");
        assert!(RunState::Completed.is_terminal());
        assert!(!RunState::Running.is_terminal());
    }

    #[test]
    fn test_report_summary_names_failing_stage_and_kind() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            state: RunState::Failed,
            context: DealContext::new(),
            failure: Some(DealflowError::Checkpoint(CheckpointError::Rejected {
                stage: StageId::Negotiation,
            })),
            events: Vec::new(),
        };

        let summary = report.summary();
        assert!(summary.contains("negotiation"));
        assert!(summary.contains("checkpoint_rejected"));
        assert_eq!(report.failing_stage(), Some(StageId::Negotiation));
    }

    #[test]
    fn test_completed_report() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            state: RunState::Completed,
            context: DealContext::new(),
            failure: None,
            events: Vec::new(),
        };
        assert!(report.is_completed());
        assert!(report.failure_kind().is_none());
    }
}
