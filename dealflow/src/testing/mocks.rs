//! Mock workers, tool adapters and reviewers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::checkpoint::{CheckpointDecision, CheckpointGate, CheckpointRequest, ReviewerChannel};
use crate::context::ContextView;
use crate::errors::WorkerError;
use crate::stage::StageId;
use crate::tools::{ToolAdapter, ToolCall, ToolFailure, ToolGateway};
use crate::worker::{ArtifactDraft, Worker};

/// What a [`MockWorker`] saw on one invocation.
#[derive(Debug, Clone)]
pub struct ObservedView {
    /// Context version at snapshot time.
    pub context_version: u64,
    /// Stages whose artifacts were visible.
    pub visible_dependencies: Vec<StageId>,
    /// Revision notes carried by the view.
    pub revision_notes: Vec<String>,
}

/// A worker with scripted outcomes and call recording.
///
/// Scripted results are consumed in order; once the script is empty the
/// worker falls back to a deterministic success derived from the view, so
/// identical views keep producing identical drafts.
#[derive(Debug)]
pub struct MockWorker {
    stage: StageId,
    script: Mutex<VecDeque<Result<ArtifactDraft, String>>>,
    delay: Option<Duration>,
    calls: AtomicU32,
    observed: Mutex<Vec<ObservedView>>,
}

impl MockWorker {
    /// Creates a worker that always succeeds deterministically.
    #[must_use]
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicU32::new(0),
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Queues a scripted success.
    #[must_use]
    pub fn then_draft(self, draft: ArtifactDraft) -> Self {
        self.script.lock().push_back(Ok(draft));
        self
    }

    /// Queues a scripted failure.
    #[must_use]
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(message.into()));
        self
    }

    /// Adds an execution delay, to force overlap in concurrency tests.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The views observed by each invocation, in order.
    #[must_use]
    pub fn observed(&self) -> Vec<ObservedView> {
        self.observed.lock().clone()
    }

    fn fallback_draft(&self, view: &ContextView) -> ArtifactDraft {
        ArtifactDraft::new(serde_json::json!({
            "stage": self.stage.as_str(),
            "revision": view.revision_notes().len(),
        }))
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn stage(&self) -> StageId {
        self.stage
    }

    async fn execute(&self, view: &ContextView) -> Result<ArtifactDraft, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.observed.lock().push(ObservedView {
            context_version: view.context_version(),
            visible_dependencies: view.dependency_artifacts().map(|a| a.stage).collect(),
            revision_notes: view.revision_notes().to_vec(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.script.lock().pop_front() {
            Some(Ok(draft)) => Ok(draft),
            Some(Err(message)) => Err(WorkerError::msg(self.stage, message)),
            None => Ok(self.fallback_draft(view)),
        }
    }
}

/// Returns its parameters unchanged, counting calls.
#[derive(Debug)]
pub struct EchoAdapter {
    name: String,
    calls: AtomicU32,
}

impl EchoAdapter {
    /// Creates an echo adapter under the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of executed calls.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolAdapter for EchoAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, params: &serde_json::Value) -> Result<serde_json::Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(params.clone())
    }
}

/// Fails transiently a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyAdapter {
    name: String,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl FlakyAdapter {
    /// Creates an adapter that fails `failures` times before succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of executed calls.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolAdapter for FlakyAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _params: &serde_json::Value) -> Result<serde_json::Value, ToolFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            Err(ToolFailure::transient("simulated upstream flake"))
        } else {
            Ok(serde_json::json!({"ok": true, "call": call}))
        }
    }
}

/// Always fails permanently.
#[derive(Debug)]
pub struct PermanentFailAdapter {
    name: String,
    detail: String,
    calls: AtomicU32,
}

impl PermanentFailAdapter {
    /// Creates an adapter failing with the given detail.
    #[must_use]
    pub fn new(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: detail.into(),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of executed calls.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolAdapter for PermanentFailAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _params: &serde_json::Value) -> Result<serde_json::Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolFailure::permanent(self.detail.clone()))
    }
}

/// Hangs past any reasonable attempt timeout a fixed number of times, then
/// echoes. Exercises the gateway's timeout-as-transient path.
#[derive(Debug)]
pub struct HangingAdapter {
    name: String,
    hangs_left: AtomicU32,
    hang_for: Duration,
}

impl HangingAdapter {
    /// Creates an adapter that hangs for `hang_for` on its first `hangs`
    /// calls.
    #[must_use]
    pub fn new(name: impl Into<String>, hangs: u32, hang_for: Duration) -> Self {
        Self {
            name: name.into(),
            hangs_left: AtomicU32::new(hangs),
            hang_for,
        }
    }
}

#[async_trait]
impl ToolAdapter for HangingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, params: &serde_json::Value) -> Result<serde_json::Value, ToolFailure> {
        let hang = self
            .hangs_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            tokio::time::sleep(self.hang_for).await;
        }
        Ok(params.clone())
    }
}

/// A worker that exercises the tool gateway and reports the outcome in its
/// draft. Used to test end-to-end tool retry behavior through a stage.
#[derive(Debug)]
pub struct GatewayProbeWorker {
    stage: StageId,
    gateway: Arc<ToolGateway>,
    tool: String,
    params: serde_json::Value,
}

impl GatewayProbeWorker {
    /// Creates a probe invoking `tool` with `params` once per execution.
    #[must_use]
    pub fn new(
        stage: StageId,
        gateway: Arc<ToolGateway>,
        tool: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            stage,
            gateway,
            tool: tool.into(),
            params,
        }
    }
}

#[async_trait]
impl Worker for GatewayProbeWorker {
    fn stage(&self) -> StageId {
        self.stage
    }

    async fn execute(&self, _view: &ContextView) -> Result<ArtifactDraft, WorkerError> {
        let call = ToolCall::new(self.tool.clone(), self.params.clone());
        let output = self
            .gateway
            .invoke(call)
            .await
            .map_err(|err| WorkerError::new(self.stage, err))?;

        Ok(ArtifactDraft::new(serde_json::json!({
            "value": output.value,
            "attempts": output.attempts,
        })))
    }
}

/// A reviewer that resolves checkpoints from a per-stage script.
///
/// Stages without a script are left pending, which is how timeout paths are
/// exercised. Attach the gate handle before running.
#[derive(Default)]
pub struct ScriptedReviewer {
    decisions: Mutex<HashMap<StageId, VecDeque<CheckpointDecision>>>,
    gate: Mutex<Option<Weak<CheckpointGate>>>,
    seen: Mutex<Vec<CheckpointRequest>>,
}

impl ScriptedReviewer {
    /// Creates a reviewer with no script: every checkpoint stays pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a decision for the next checkpoint of `stage`.
    #[must_use]
    pub fn decide(self, stage: StageId, decision: CheckpointDecision) -> Self {
        self.decisions.lock().entry(stage).or_default().push_back(decision);
        self
    }

    /// Attaches the gate the reviewer resolves against.
    pub fn attach(&self, gate: &Arc<CheckpointGate>) {
        *self.gate.lock() = Some(Arc::downgrade(gate));
    }

    /// Requests seen so far, in arrival order.
    #[must_use]
    pub fn seen(&self) -> Vec<CheckpointRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ReviewerChannel for ScriptedReviewer {
    async fn notify(&self, request: &CheckpointRequest) {
        self.seen.lock().push(request.clone());

        let decision = self
            .decisions
            .lock()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front);
        let Some(decision) = decision else {
            return;
        };
        let gate = self.gate.lock().as_ref().and_then(Weak::upgrade);
        if let Some(gate) = gate {
            // The sender slot is registered before notify, so resolving
            // synchronously is safe.
            gate.resolve(request.id, decision);
        }
    }
}

impl std::fmt::Debug for ScriptedReviewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedReviewer")
            .field("seen", &self.seen.lock().len())
            .finish()
    }
}
