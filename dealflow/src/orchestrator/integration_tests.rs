//! End-to-end runs over the seven-stage lifecycle.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::{Orchestrator, OrchestratorConfig, RunState};
use crate::checkpoint::CheckpointDecision;
use crate::context::DealContext;
use crate::stage::{StageGraphBuilder, StageId};
use crate::testing::fixtures::{draft, lifecycle_graph, mock_worker_set};
use crate::testing::mocks::{GatewayProbeWorker, HangingAdapter, MockWorker, ScriptedReviewer};
use crate::tools::{GatewayConfig, Jitter, RetryConfig, ToolGateway, ToolRegistry};
use crate::worker::WorkerRegistry;

fn config(max_revisions: u32, checkpoint_timeout: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        max_revisions,
        checkpoint_timeout,
    }
}

#[tokio::test]
async fn test_ungated_lifecycle_completes_in_dependency_order() {
    let (registry, handles) = mock_worker_set();
    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[]),
        registry,
        OrchestratorConfig::default(),
    )
    .unwrap();

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.failure.is_none());
    assert_eq!(report.context.committed_stages().len(), 7);

    // Each stage ran exactly once.
    for handle in &handles {
        assert_eq!(handle.calls(), 1);
    }

    // Every stage saw its dependency's artifact, already committed.
    for (i, handle) in handles.iter().enumerate().skip(1) {
        let observed = handle.observed();
        assert_eq!(observed[0].visible_dependencies, vec![StageId::ALL[i - 1]]);
    }

    // Sequence numbers are monotonic in commit order.
    let seqs: Vec<u64> = report.context.artifacts().map(|a| a.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);

    // The audit log brackets the run.
    assert_eq!(report.events[0].event_type, "run.started");
    assert_eq!(
        report.events.last().unwrap().event_type,
        "run.completed"
    );
}

#[tokio::test]
async fn test_gated_lifecycle_completes_after_both_approvals() {
    let (registry, _handles) = mock_worker_set();
    let reviewer = Arc::new(
        ScriptedReviewer::new()
            .decide(StageId::DueDiligence, CheckpointDecision::Approved)
            .decide(StageId::Negotiation, CheckpointDecision::Approved),
    );

    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[StageId::DueDiligence, StageId::Negotiation]),
        registry,
        config(2, Duration::from_secs(5)),
    )
    .unwrap()
    .with_reviewer(reviewer.clone());
    reviewer.attach(&orchestrator.checkpoint_gate());

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.context.committed_stages().len(), 7);
    assert_eq!(reviewer.seen().len(), 2);
}

#[tokio::test]
async fn test_rejection_fails_run_and_nothing_commits_beyond() {
    let (registry, handles) = mock_worker_set();
    let reviewer = Arc::new(
        ScriptedReviewer::new()
            .decide(StageId::DueDiligence, CheckpointDecision::Approved)
            .decide(StageId::Negotiation, CheckpointDecision::Rejected),
    );

    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[StageId::DueDiligence, StageId::Negotiation]),
        registry,
        config(2, Duration::from_secs(5)),
    )
    .unwrap()
    .with_reviewer(reviewer.clone());
    reviewer.attach(&orchestrator.checkpoint_gate());

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure_kind(), Some("checkpoint_rejected"));
    assert_eq!(report.failing_stage(), Some(StageId::Negotiation));

    // DueDiligence was approved and committed; Negotiation and Legal never
    // made it into the context.
    assert!(report.context.is_committed(StageId::DueDiligence));
    assert!(!report.context.is_committed(StageId::Negotiation));
    assert!(!report.context.is_committed(StageId::Legal));

    // The Legal worker never ran.
    assert_eq!(handles[StageId::Legal.ordinal()].calls(), 0);
}

#[tokio::test]
async fn test_revise_reinvokes_with_notes_then_commits() {
    let mut registry = WorkerRegistry::new();
    let mut handles = Vec::new();
    for id in StageId::ALL {
        let worker = Arc::new(MockWorker::new(id));
        handles.push(worker.clone());
        registry = registry.register(worker);
    }

    let reviewer = Arc::new(
        ScriptedReviewer::new()
            .decide(
                StageId::Valuation,
                CheckpointDecision::revise("use trailing twelve months"),
            )
            .decide(StageId::Valuation, CheckpointDecision::Approved),
    );

    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[StageId::Valuation]),
        registry,
        config(2, Duration::from_secs(5)),
    )
    .unwrap()
    .with_reviewer(reviewer.clone());
    reviewer.attach(&orchestrator.checkpoint_gate());

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Completed);

    let valuation = &handles[StageId::Valuation.ordinal()];
    assert_eq!(valuation.calls(), 2);

    let observed = valuation.observed();
    assert!(observed[0].revision_notes.is_empty());
    assert_eq!(
        observed[1].revision_notes,
        vec!["use trailing twelve months".to_string()]
    );

    // The committed artifact is the revision.
    let artifact = report.context.artifact(StageId::Valuation).unwrap();
    assert_eq!(artifact.revision, 1);
}

#[tokio::test]
async fn test_revision_budget_exhaustion_fails_run() {
    let (registry, handles) = mock_worker_set();
    let reviewer = Arc::new(
        ScriptedReviewer::new()
            .decide(StageId::Valuation, CheckpointDecision::revise("again"))
            .decide(StageId::Valuation, CheckpointDecision::revise("still not right")),
    );

    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[StageId::Valuation]),
        registry,
        config(1, Duration::from_secs(5)),
    )
    .unwrap()
    .with_reviewer(reviewer.clone());
    reviewer.attach(&orchestrator.checkpoint_gate());

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure_kind(), Some("revision_budget_exhausted"));
    assert_eq!(report.failing_stage(), Some(StageId::Valuation));

    // Initial attempt plus the single budgeted revision.
    assert_eq!(handles[StageId::Valuation.ordinal()].calls(), 2);
    assert!(!report.context.is_committed(StageId::Valuation));
}

#[tokio::test]
async fn test_checkpoint_timeout_fails_run_without_commit() {
    let (registry, _handles) = mock_worker_set();
    // No reviewer script: the Valuation checkpoint stays pending.
    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[StageId::Valuation]),
        registry,
        config(2, Duration::from_millis(50)),
    )
    .unwrap();

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure_kind(), Some("checkpoint_timeout"));
    assert!(!report.context.is_committed(StageId::Valuation));
    assert_eq!(report.events.iter().filter(|e| e.event_type == "checkpoint.timeout").count(), 1);
}

#[tokio::test]
async fn test_worker_failure_halts_pipeline() {
    let mut registry = WorkerRegistry::new();
    let mut handles = Vec::new();
    for id in StageId::ALL {
        let worker = if id == StageId::DataCollection {
            Arc::new(MockWorker::new(id).then_fail("financials unavailable"))
        } else {
            Arc::new(MockWorker::new(id))
        };
        handles.push(worker.clone());
        registry = registry.register(worker);
    }

    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[]),
        registry,
        OrchestratorConfig::default(),
    )
    .unwrap();

    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure_kind(), Some("worker_execution"));
    assert_eq!(report.failing_stage(), Some(StageId::DataCollection));

    // Upstream stages committed, downstream never ran.
    assert!(report.context.is_committed(StageId::Sourcing));
    assert!(!report.context.is_committed(StageId::DataCollection));
    assert_eq!(handles[StageId::Valuation.ordinal()].calls(), 0);
}

#[tokio::test]
async fn test_tool_retries_surface_through_stage_artifact() {
    // The market-data tool hangs past the attempt timeout twice; the third
    // attempt succeeds within the retry budget of 3.
    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(HangingAdapter::new(
        "market_data",
        2,
        Duration::from_millis(500),
    )));
    let gateway = Arc::new(ToolGateway::new(tools).with_config(GatewayConfig {
        retry: RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(Jitter::None),
        call_timeout: Duration::from_millis(40),
    }));

    let graph = StageGraphBuilder::new()
        .stage(StageId::DataCollection, &[])
        .unwrap()
        .build()
        .unwrap();
    let registry = WorkerRegistry::new().register(Arc::new(GatewayProbeWorker::new(
        StageId::DataCollection,
        gateway,
        "market_data",
        serde_json::json!({"symbol": "ACME"}),
    )));

    let orchestrator =
        Orchestrator::new(graph, registry, OrchestratorConfig::default()).unwrap();
    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Completed);
    let artifact = report.context.artifact(StageId::DataCollection).unwrap();
    assert_eq!(artifact.body["attempts"], 3);
    assert_eq!(artifact.body["value"], serde_json::json!({"symbol": "ACME"}));
}

#[tokio::test]
async fn test_independent_stages_run_concurrently_and_commits_commute() {
    // Diamond: Sourcing and DataCollection both hang off Strategy and are
    // independent; Valuation joins them.
    let graph = StageGraphBuilder::new()
        .stage(StageId::Strategy, &[])
        .unwrap()
        .stage(StageId::Sourcing, &[StageId::Strategy])
        .unwrap()
        .stage(StageId::DataCollection, &[StageId::Strategy])
        .unwrap()
        .stage(
            StageId::Valuation,
            &[StageId::Sourcing, StageId::DataCollection],
        )
        .unwrap()
        .build()
        .unwrap();

    // Opposite delays so completion order flips relative to priority order.
    let sourcing = Arc::new(
        MockWorker::new(StageId::Sourcing)
            .then_draft(draft(serde_json::json!({"targets": 3})))
            .with_delay(Duration::from_millis(80)),
    );
    let data_collection = Arc::new(
        MockWorker::new(StageId::DataCollection)
            .then_draft(draft(serde_json::json!({"datasets": 5})))
            .with_delay(Duration::from_millis(10)),
    );
    let valuation = Arc::new(MockWorker::new(StageId::Valuation));

    let registry = WorkerRegistry::new()
        .register(Arc::new(MockWorker::new(StageId::Strategy)))
        .register(sourcing.clone())
        .register(data_collection.clone())
        .register(valuation.clone());

    let orchestrator =
        Orchestrator::new(graph, registry, OrchestratorConfig::default()).unwrap();
    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Completed);

    // Both branch artifacts are intact regardless of completion order.
    assert_eq!(
        report.context.artifact(StageId::Sourcing).unwrap().body,
        serde_json::json!({"targets": 3})
    );
    assert_eq!(
        report
            .context
            .artifact(StageId::DataCollection)
            .unwrap()
            .body,
        serde_json::json!({"datasets": 5})
    );

    // Valuation observed both dependencies, fully committed.
    let observed = valuation.observed();
    assert_eq!(observed.len(), 1);
    assert_eq!(
        observed[0].visible_dependencies,
        vec![StageId::Sourcing, StageId::DataCollection]
    );
}

#[tokio::test]
async fn test_gated_dependency_invisible_until_approved() {
    // DueDiligence is gated; Negotiation depends on it. While the
    // checkpoint is pending, Negotiation must not have started.
    let (registry, handles) = mock_worker_set();
    let orchestrator = Arc::new(
        Orchestrator::new(
            lifecycle_graph(&[StageId::DueDiligence]),
            registry,
            config(2, Duration::from_secs(5)),
        )
        .unwrap(),
    );
    let gate = orchestrator.checkpoint_gate();

    let runner = orchestrator.clone();
    let handle = tokio::spawn(async move { runner.run(DealContext::new()).await });

    // Wait for the checkpoint to become pending.
    let mut pending = Vec::new();
    for _ in 0..100 {
        pending = gate.pending_requests();
        if !pending.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(pending.len(), 1);
    assert_eq!(orchestrator.current_state(), RunState::SuspendedAtCheckpoint);

    // Suspended at the gate: the dependent stage has not run.
    assert_eq!(handles[StageId::Negotiation.ordinal()].calls(), 0);

    gate.resolve(pending[0], CheckpointDecision::Approved);
    let report = handle.await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(handles[StageId::Negotiation.ordinal()].calls(), 1);
}

#[tokio::test]
async fn test_operator_cancellation_fails_run() {
    // Long checkpoint window, no reviewer: the run parks at the gate until
    // the operator aborts.
    let (registry, _handles) = mock_worker_set();
    let orchestrator = Arc::new(
        Orchestrator::new(
            lifecycle_graph(&[StageId::Valuation]),
            registry,
            config(2, Duration::from_secs(60)),
        )
        .unwrap(),
    );
    let gate = orchestrator.checkpoint_gate();
    let token = orchestrator.cancellation_token();

    let runner = orchestrator.clone();
    let handle = tokio::spawn(async move { runner.run(DealContext::new()).await });

    for _ in 0..100 {
        if !gate.pending_requests().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    token.cancel("operator abort");

    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure_kind(), Some("cancelled"));
    // No waiter left dangling at the gate.
    assert_eq!(gate.pending_count(), 0);
}

#[tokio::test]
async fn test_initial_facts_visible_to_all_stages() {
    let (registry, _handles) = mock_worker_set();
    let fact_checks = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let checks = fact_checks.clone();
    // Replace the Legal worker with one recording the seeded fact.
    let registry = registry.register(Arc::new(crate::worker::FnWorker::new(
        StageId::Legal,
        move |view| {
            checks
                .lock()
                .push(view.fact("target_profile").cloned());
            Ok(draft(serde_json::json!({"cleared": true})))
        },
    )));

    let orchestrator = Orchestrator::new(
        lifecycle_graph(&[]),
        registry,
        OrchestratorConfig::default(),
    )
    .unwrap();

    let initial = DealContext::new().with_fact(
        "target_profile",
        serde_json::json!({"sector": "logistics"}),
    );
    let report = orchestrator.run(initial).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        fact_checks.lock().as_slice(),
        &[Some(serde_json::json!({"sector": "logistics"}))]
    );
}

#[tokio::test]
async fn test_run_report_summary_for_tool_failure() {
    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(
        crate::testing::mocks::PermanentFailAdapter::new("doc_gen", "invalid template"),
    ));
    let gateway = Arc::new(ToolGateway::new(tools));

    let graph = StageGraphBuilder::new()
        .stage(StageId::Legal, &[])
        .unwrap()
        .build()
        .unwrap();
    let registry = WorkerRegistry::new().register(Arc::new(GatewayProbeWorker::new(
        StageId::Legal,
        gateway,
        "doc_gen",
        serde_json::json!({}),
    )));

    let orchestrator =
        Orchestrator::new(graph, registry, OrchestratorConfig::default()).unwrap();
    let report = orchestrator.run(DealContext::new()).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failure_kind(), Some("worker_execution"));
    let summary = report.summary();
    assert!(summary.contains("legal"));
    assert!(summary.contains("invalid template"));
}
