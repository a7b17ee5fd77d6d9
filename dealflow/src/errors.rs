//! Error types for the dealflow engine.
//!
//! The taxonomy separates construction-time graph errors from runtime
//! failures, and tags every runtime failure with the stage or tool that
//! produced it so the final run report can name the origin without exposing
//! retry internals.

use std::time::Duration;
use thiserror::Error;

use crate::stage::StageId;

/// The top-level error type for dealflow operations.
#[derive(Debug, Error)]
pub enum DealflowError {
    /// The stage graph failed validation at construction.
    #[error("{0}")]
    Graph(#[from] GraphValidationError),

    /// A worker invocation failed.
    #[error("{0}")]
    Worker(#[from] WorkerError),

    /// A tool invocation failed terminally.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// A checkpoint did not resolve to approval.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// A context commit or read violated the append-only contract.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// A stage exceeded its revision budget.
    #[error("stage '{stage}' exhausted its revision budget after {attempts} attempts")]
    RevisionBudgetExhausted {
        /// The stage that kept being sent back for revision.
        stage: StageId,
        /// Total attempts made, including the initial one.
        attempts: u32,
    },

    /// The run was cancelled cooperatively.
    #[error("run cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason recorded by the token.
        reason: String,
    },

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DealflowError {
    /// A short machine-readable kind, used in run reports and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Graph(_) => "graph_validation",
            Self::Worker(_) => "worker_execution",
            Self::Tool(ToolError::Exhausted { .. }) => "tool_transient_exhausted",
            Self::Tool(_) => "tool_permanent",
            Self::Checkpoint(CheckpointError::TimedOut { .. }) => "checkpoint_timeout",
            Self::Checkpoint(CheckpointError::Rejected { .. }) => "checkpoint_rejected",
            Self::Checkpoint(_) => "checkpoint",
            Self::Context(_) => "context_conflict",
            Self::RevisionBudgetExhausted { .. } => "revision_budget_exhausted",
            Self::Cancelled { .. } => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// The stage the error originates from, when one is known.
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Worker(e) => Some(e.stage),
            Self::Checkpoint(e) => Some(e.stage()),
            Self::RevisionBudgetExhausted { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Error raised when the stage graph fails validation.
///
/// These errors are only produced at construction time; a built
/// [`StageGraph`](crate::stage::StageGraph) is guaranteed acyclic and
/// closed over its dependencies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    /// The graph contains a dependency cycle.
    #[error("dependency cycle: {}", format_path(path))]
    Cycle {
        /// The stages forming the cycle, first stage repeated at the end.
        path: Vec<StageId>,
    },

    /// A stage depends on a stage that is not in the graph.
    #[error("stage '{stage}' depends on '{dependency}', which is not in the graph")]
    UnknownDependency {
        /// The declaring stage.
        stage: StageId,
        /// The missing dependency.
        dependency: StageId,
    },

    /// The same stage was declared twice.
    #[error("stage '{stage}' declared more than once")]
    DuplicateStage {
        /// The repeated stage.
        stage: StageId,
    },

    /// A stage lists itself as a dependency.
    #[error("stage '{stage}' depends on itself")]
    SelfDependency {
        /// The offending stage.
        stage: StageId,
    },

    /// A graph stage has no worker registered for it.
    #[error("no worker registered for stage '{stage}'")]
    MissingWorker {
        /// The uncovered stage.
        stage: StageId,
    },

    /// The graph has no stages.
    #[error("stage graph is empty")]
    Empty,
}

fn format_path(path: &[StageId]) -> String {
    path.iter()
        .map(StageId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Error surfaced by a worker to the orchestrator.
///
/// Worker internals are a black box, so the cause is an [`anyhow::Error`];
/// the stage tag is what the orchestrator and the run report act on.
#[derive(Debug, Error)]
#[error("worker for stage '{stage}' failed: {source}")]
pub struct WorkerError {
    /// The stage whose worker failed.
    pub stage: StageId,
    /// The underlying failure.
    #[source]
    pub source: anyhow::Error,
}

impl WorkerError {
    /// Wraps any error as a stage-tagged worker failure.
    #[must_use]
    pub fn new(stage: StageId, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Builds a worker failure from a message.
    #[must_use]
    pub fn msg(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            source: anyhow::Error::msg(message.into()),
        }
    }
}

/// Terminal errors returned by the tool gateway.
///
/// Transient failures are retried inside the gateway and never escape it;
/// callers only ever see one of these terminal shapes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// No adapter is registered under the requested name.
    #[error("tool '{tool}' is not registered")]
    NotFound {
        /// The requested tool name.
        tool: String,
    },

    /// The adapter classified the failure as permanent.
    #[error("tool '{tool}' failed permanently: {detail}")]
    Permanent {
        /// The tool name.
        tool: String,
        /// Adapter-supplied failure detail.
        detail: String,
    },

    /// The retry budget was exhausted on transient failures.
    #[error("tool '{tool}' failed after {attempts} attempts; last error: {last}")]
    Exhausted {
        /// The tool name.
        tool: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// Detail of the final transient failure.
        last: String,
    },

    /// The call was cancelled before reaching a terminal result.
    #[error("tool '{tool}' call cancelled")]
    Cancelled {
        /// The tool name.
        tool: String,
    },
}

/// Errors produced while waiting on a checkpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckpointError {
    /// No decision arrived within the configured window.
    #[error("checkpoint for stage '{stage}' timed out after {timeout:?}")]
    TimedOut {
        /// The gated stage.
        stage: StageId,
        /// The configured window.
        timeout: Duration,
    },

    /// The reviewer rejected the candidate artifact.
    #[error("checkpoint for stage '{stage}' was rejected")]
    Rejected {
        /// The gated stage.
        stage: StageId,
    },

    /// The run was cancelled while the checkpoint was pending.
    #[error("checkpoint for stage '{stage}' cancelled")]
    Cancelled {
        /// The gated stage.
        stage: StageId,
    },

    /// The gate was dropped while the checkpoint was pending.
    #[error("checkpoint for stage '{stage}' closed without a decision")]
    Closed {
        /// The gated stage.
        stage: StageId,
    },
}

impl CheckpointError {
    /// The stage the checkpoint belonged to.
    #[must_use]
    pub fn stage(&self) -> StageId {
        match self {
            Self::TimedOut { stage, .. }
            | Self::Rejected { stage }
            | Self::Cancelled { stage }
            | Self::Closed { stage } => *stage,
        }
    }
}

/// Errors raised by the context store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// An artifact for the stage is already committed.
    #[error("artifact for stage '{stage}' is already committed")]
    DuplicateArtifact {
        /// The stage with an existing commit.
        stage: StageId,
    },

    /// A shared fact with the same key already exists.
    #[error("fact '{key}' already exists")]
    FactConflict {
        /// The conflicting key.
        key: String,
    },

    /// A worker read a stage it did not declare as a dependency.
    #[error("stage '{stage}' accessed '{dependency}', which it did not declare as a dependency")]
    UndeclaredDependency {
        /// The reading stage.
        stage: StageId,
        /// The stage it tried to read.
        dependency: StageId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_formats_path() {
        let err = GraphValidationError::Cycle {
            path: vec![StageId::Strategy, StageId::Sourcing, StageId::Strategy],
        };
        assert!(err.to_string().contains("strategy -> sourcing -> strategy"));
    }

    #[test]
    fn test_worker_error_carries_stage() {
        let err = WorkerError::msg(StageId::Valuation, "model diverged");
        assert_eq!(err.stage, StageId::Valuation);
        assert!(err.to_string().contains("valuation"));
        assert!(err.to_string().contains("model diverged"));
    }

    #[test]
    fn test_tool_exhausted_mentions_attempts() {
        let err = ToolError::Exhausted {
            tool: "market_data".to_string(),
            attempts: 3,
            last: "connection reset".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_error_kind_mapping() {
        let err = DealflowError::Checkpoint(CheckpointError::Rejected {
            stage: StageId::Negotiation,
        });
        assert_eq!(err.kind(), "checkpoint_rejected");
        assert_eq!(err.stage(), Some(StageId::Negotiation));

        let err = DealflowError::RevisionBudgetExhausted {
            stage: StageId::DueDiligence,
            attempts: 3,
        };
        assert_eq!(err.kind(), "revision_budget_exhausted");
    }

    #[test]
    fn test_checkpoint_error_stage_accessor() {
        let err = CheckpointError::TimedOut {
            stage: StageId::Valuation,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.stage(), StageId::Valuation);
    }
}
