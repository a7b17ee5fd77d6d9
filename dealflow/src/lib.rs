//! # Dealflow
//!
//! An orchestration engine for a staged acquisition lifecycle: strategy,
//! sourcing, data collection, valuation, due diligence, negotiation and
//! legal review.
//!
//! The engine provides:
//!
//! - **Stage scheduling**: a validated dependency DAG executed in
//!   deterministic topological priority, independent stages concurrently
//! - **Context management**: append-only shared state with scoped
//!   read-views per worker
//! - **Tool gateway**: uniform retry/timeout/idempotency wrapping around
//!   external side effects
//! - **Human checkpoints**: approval gates with revise loops, timeouts and
//!   cancellation
//! - **Audit log**: every stage, checkpoint and tool outcome as a
//!   structured event sequence
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dealflow::prelude::*;
//!
//! let graph = StageGraphBuilder::new()
//!     .stage(StageId::Strategy, &[])?
//!     .gated_stage(StageId::Valuation, &[StageId::Strategy])?
//!     .build()?;
//!
//! let orchestrator = Orchestrator::new(graph, workers, OrchestratorConfig::default())?;
//! let report = orchestrator.run(DealContext::new()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifact;
pub mod cancellation;
pub mod checkpoint;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod stage;
pub mod testing;
pub mod tools;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::Artifact;
    pub use crate::cancellation::CancellationToken;
    pub use crate::checkpoint::{
        CheckpointDecision, CheckpointGate, CheckpointRequest, ReviewerChannel,
    };
    pub use crate::context::{ContextView, DealContext};
    pub use crate::errors::{
        CheckpointError, ContextError, DealflowError, GraphValidationError, ToolError,
        WorkerError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::{Orchestrator, OrchestratorConfig, RunReport, RunState};
    pub use crate::stage::{StageGraph, StageGraphBuilder, StageId, StageSpec};
    pub use crate::tools::{
        GatewayConfig, RetryConfig, ToolAdapter, ToolCall, ToolGateway, ToolRegistry,
    };
    pub use crate::worker::{ArtifactDraft, FnWorker, Worker, WorkerRegistry};
}
