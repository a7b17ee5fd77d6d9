//! The orchestrator: stage scheduling, checkpoint policy, failure handling.
//!
//! The run loop keeps a ready set — stages whose dependencies are all
//! committed and which have not been attempted in the current revision
//! cycle — and executes ready stages as concurrent tasks. Artifact commits
//! and ready-set recomputation happen only on the orchestrator task, under
//! one mutex that is never held across an await point, so workers race on
//! nothing. Gated stages suspend the pipeline at the checkpoint gate; a
//! revise decision folds the reviewer's notes into the context and re-admits
//! the stage, bounded by the revision budget.

mod report;

#[cfg(test)]
mod integration_tests;

pub use report::{RunReport, RunState};

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::cancellation::CancellationToken;
use crate::checkpoint::{CheckpointDecision, CheckpointGate, CheckpointRequest, ReviewerChannel};
use crate::context::DealContext;
use crate::errors::{CheckpointError, DealflowError, WorkerError};
use crate::events::{CollectingEventSink, EventSink};
use crate::stage::{StageGraph, StageId};
use crate::worker::{ArtifactDraft, WorkerRegistry};

/// Budgets and timeouts for a run.
///
/// Both knobs are deliberately configuration: the right values depend on
/// reviewer availability and tool latency, not on the engine.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many times a stage may be sent back for revision before the run
    /// fails with a budget-exhausted error.
    pub max_revisions: u32,
    /// How long a checkpoint may stay pending before it times out.
    pub checkpoint_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_revisions: 2,
            checkpoint_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives one acquisition lifecycle run over a validated stage graph.
pub struct Orchestrator {
    graph: StageGraph,
    workers: Arc<WorkerRegistry>,
    config: OrchestratorConfig,
    gate: Arc<CheckpointGate>,
    cancel: CancellationToken,
    state: Arc<RwLock<RunState>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Orchestrator {
    /// Creates an orchestrator, validating that every graph stage has a
    /// registered worker.
    ///
    /// # Errors
    ///
    /// Returns a graph validation error naming the first uncovered stage.
    pub fn new(
        graph: StageGraph,
        workers: WorkerRegistry,
        config: OrchestratorConfig,
    ) -> Result<Self, DealflowError> {
        workers.validate_for(&graph)?;
        let cancel = CancellationToken::new();
        let gate = Arc::new(
            CheckpointGate::new()
                .with_timeout(config.checkpoint_timeout)
                .with_cancellation(cancel.clone()),
        );
        Ok(Self {
            graph,
            workers: Arc::new(workers),
            config,
            gate,
            cancel,
            state: Arc::new(RwLock::new(RunState::Initializing)),
            sinks: Vec::new(),
        })
    }

    /// Sets the reviewer channel for checkpoint notifications.
    ///
    /// Configure before sharing the gate handle: this rebuilds the gate.
    #[must_use]
    pub fn with_reviewer(mut self, reviewer: Arc<dyn ReviewerChannel>) -> Self {
        self.gate = Arc::new(
            CheckpointGate::new()
                .with_timeout(self.config.checkpoint_timeout)
                .with_cancellation(self.cancel.clone())
                .with_reviewer(reviewer),
        );
        self
    }

    /// Adds an event sink observing the run log.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The checkpoint gate handle, for delivering reviewer decisions.
    #[must_use]
    pub fn checkpoint_gate(&self) -> Arc<CheckpointGate> {
        self.gate.clone()
    }

    /// The run's cancellation token, for operator aborts.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The current run state.
    #[must_use]
    pub fn current_state(&self) -> RunState {
        *self.state.read()
    }

    fn set_state(&self, state: RunState) {
        *self.state.write() = state;
    }

    /// Executes the lifecycle to a terminal state.
    ///
    /// Never returns an `Err`: failures are terminal run outcomes, not
    /// caller exceptions, and arrive inside the report with the originating
    /// stage and error kind.
    pub async fn run(&self, initial: DealContext) -> RunReport {
        let run_id = Uuid::new_v4();
        let log = Arc::new(CollectingEventSink::new());
        let ctx = Mutex::new(initial);

        // Revisions consumed per stage.
        let mut revisions: HashMap<StageId, u32> = HashMap::new();
        // Stages attempted in the current revision cycle (in flight or
        // resolved); a revise decision removes its stage to re-admit it.
        let mut scheduled: BTreeSet<StageId> = BTreeSet::new();
        let mut in_flight: FuturesUnordered<
            JoinHandle<(StageId, Result<ArtifactDraft, WorkerError>)>,
        > = FuturesUnordered::new();

        info!(%run_id, stages = self.graph.len(), "run started");
        self.set_state(RunState::Running);
        self.emit(
            &log,
            "run.started",
            Some(serde_json::json!({
                "run_id": run_id,
                "stages": self.graph.len(),
            })),
        );

        let failure = loop {
            if self.cancel.is_cancelled() {
                break Some(DealflowError::Cancelled {
                    reason: self.cancel.reason_or_default(),
                });
            }

            let committed = ctx.lock().committed_stages();
            if committed.len() == self.graph.len() {
                break None;
            }

            for stage in self.graph.ready_stages(&committed) {
                if !scheduled.insert(stage) {
                    continue;
                }
                let Some(worker) = self.workers.get(stage) else {
                    // Unreachable past construction-time validation.
                    scheduled.remove(&stage);
                    continue;
                };
                let view = ctx.lock().view_for(stage, &self.graph.dependencies(stage));
                let revision = revisions.get(&stage).copied().unwrap_or(0);
                debug!(%run_id, stage = %stage, revision, "stage started");
                self.emit(
                    &log,
                    "stage.started",
                    Some(serde_json::json!({
                        "stage": stage,
                        "revision": revision,
                    })),
                );
                in_flight.push(tokio::spawn(async move {
                    let result = worker.execute(&view).await;
                    (stage, result)
                }));
            }

            if in_flight.is_empty() {
                let pending: Vec<StageId> = self
                    .graph
                    .priority_order()
                    .iter()
                    .copied()
                    .filter(|s| !committed.contains(s))
                    .collect();
                break Some(DealflowError::Internal(format!(
                    "stage graph deadlocked; remaining stages: {pending:?}"
                )));
            }

            let joined = tokio::select! {
                () = self.cancel.cancelled() => {
                    break Some(DealflowError::Cancelled {
                        reason: self.cancel.reason_or_default(),
                    });
                }
                next = in_flight.next() => next,
            };

            let (stage, result) = match joined {
                Some(Ok(pair)) => pair,
                Some(Err(join_err)) => {
                    break Some(DealflowError::Internal(format!(
                        "stage task panicked: {join_err}"
                    )));
                }
                None => continue,
            };

            let draft = match result {
                Ok(draft) => draft,
                Err(err) => {
                    warn!(%run_id, stage = %stage, error = %err, "stage failed");
                    self.emit(
                        &log,
                        "stage.failed",
                        Some(serde_json::json!({
                            "stage": stage,
                            "error": err.to_string(),
                        })),
                    );
                    break Some(DealflowError::Worker(err));
                }
            };

            let revision = revisions.get(&stage).copied().unwrap_or(0);
            self.emit(
                &log,
                "stage.completed",
                Some(serde_json::json!({
                    "stage": stage,
                    "revision": revision,
                })),
            );

            let artifact = ctx.lock().artifact_from_draft(stage, revision, draft);

            if self.graph.requires_checkpoint(stage) {
                match self.hold_at_checkpoint(&log, &ctx, stage, artifact, &mut revisions).await {
                    Ok(CheckpointOutcome::Committed) => {}
                    Ok(CheckpointOutcome::Reattempt) => {
                        scheduled.remove(&stage);
                    }
                    Err(err) => break Some(err),
                }
            } else if let Err(err) = self.commit(&log, &ctx, artifact) {
                break Some(err);
            }
        };

        self.finish(run_id, &log, &ctx, failure)
    }

    /// Suspends at the gate until the candidate is approved, sent back or
    /// the wait fails. No context lock is held while waiting.
    async fn hold_at_checkpoint(
        &self,
        log: &Arc<CollectingEventSink>,
        ctx: &Mutex<DealContext>,
        stage: StageId,
        artifact: Artifact,
        revisions: &mut HashMap<StageId, u32>,
    ) -> Result<CheckpointOutcome, DealflowError> {
        let request = CheckpointRequest::new(stage, artifact.clone());
        let request_id = request.id;

        self.set_state(RunState::SuspendedAtCheckpoint);
        self.emit(
            log,
            "checkpoint.submitted",
            Some(serde_json::json!({
                "request_id": request_id,
                "stage": stage,
                "seq": artifact.seq,
                "revision": artifact.revision,
            })),
        );

        let decision = self.gate.submit(request).await;
        self.set_state(RunState::Running);

        match decision {
            Ok(CheckpointDecision::Approved) => {
                self.emit(
                    log,
                    "checkpoint.approved",
                    Some(serde_json::json!({
                        "request_id": request_id,
                        "stage": stage,
                    })),
                );
                self.commit(log, ctx, artifact)?;
                Ok(CheckpointOutcome::Committed)
            }
            Ok(CheckpointDecision::Revise { notes }) => {
                let done = revisions.entry(stage).or_insert(0);
                if *done >= self.config.max_revisions {
                    self.emit(
                        log,
                        "checkpoint.revision_exhausted",
                        Some(serde_json::json!({
                            "request_id": request_id,
                            "stage": stage,
                            "attempts": *done + 1,
                        })),
                    );
                    return Err(DealflowError::RevisionBudgetExhausted {
                        stage,
                        attempts: *done + 1,
                    });
                }
                *done += 1;
                ctx.lock().append_revision_notes(stage, notes.clone());
                self.emit(
                    log,
                    "checkpoint.revise",
                    Some(serde_json::json!({
                        "request_id": request_id,
                        "stage": stage,
                        "notes": notes,
                        "next_revision": *done,
                    })),
                );
                Ok(CheckpointOutcome::Reattempt)
            }
            Ok(CheckpointDecision::Rejected) => {
                self.emit(
                    log,
                    "checkpoint.rejected",
                    Some(serde_json::json!({
                        "request_id": request_id,
                        "stage": stage,
                    })),
                );
                Err(DealflowError::Checkpoint(CheckpointError::Rejected { stage }))
            }
            Err(err) => {
                let event = match &err {
                    CheckpointError::TimedOut { .. } => "checkpoint.timeout",
                    _ => "checkpoint.aborted",
                };
                self.emit(
                    log,
                    event,
                    Some(serde_json::json!({
                        "request_id": request_id,
                        "stage": stage,
                        "error": err.to_string(),
                    })),
                );
                if matches!(err, CheckpointError::Cancelled { .. }) {
                    // An operator abort, not a reviewer outcome.
                    return Err(DealflowError::Cancelled {
                        reason: self.cancel.reason_or_default(),
                    });
                }
                Err(DealflowError::Checkpoint(err))
            }
        }
    }

    /// Commits an approved artifact under the context lock.
    fn commit(
        &self,
        log: &Arc<CollectingEventSink>,
        ctx: &Mutex<DealContext>,
        artifact: Artifact,
    ) -> Result<(), DealflowError> {
        let stage = artifact.stage;
        let seq = artifact.seq;
        let version = {
            let mut guard = ctx.lock();
            guard.commit(artifact)?;
            guard.version()
        };
        self.emit(
            log,
            "stage.committed",
            Some(serde_json::json!({
                "stage": stage,
                "seq": seq,
                "context_version": version,
            })),
        );
        Ok(())
    }

    fn finish(
        &self,
        run_id: Uuid,
        log: &Arc<CollectingEventSink>,
        ctx: &Mutex<DealContext>,
        failure: Option<DealflowError>,
    ) -> RunReport {
        let state = match &failure {
            None => RunState::Completed,
            Some(_) => RunState::Failed,
        };
        self.set_state(state);

        match &failure {
            None => {
                info!(%run_id, "run completed");
                self.emit(log, "run.completed", Some(serde_json::json!({"run_id": run_id})));
            }
            Some(err) => {
                warn!(%run_id, error = %err, kind = err.kind(), "run failed");
                // Abort in-flight tool calls and checkpoint waits.
                self.cancel.cancel(format!("run failed: {err}"));
                self.emit(
                    log,
                    "run.failed",
                    Some(serde_json::json!({
                        "run_id": run_id,
                        "kind": err.kind(),
                        "stage": err.stage(),
                        "error": err.to_string(),
                    })),
                );
            }
        }

        RunReport {
            run_id,
            state,
            context: ctx.lock().clone(),
            failure,
            events: log.events(),
        }
    }

    fn emit(
        &self,
        log: &Arc<CollectingEventSink>,
        event_type: &str,
        data: Option<serde_json::Value>,
    ) {
        log.try_emit(event_type, data.clone());
        for sink in &self.sinks {
            sink.try_emit(event_type, data.clone());
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.graph.len())
            .field("config", &self.config)
            .field("state", &self.current_state())
            .finish()
    }
}

enum CheckpointOutcome {
    /// Approved and committed.
    Committed,
    /// Sent back for revision; the stage re-enters the ready set.
    Reattempt,
}
