//! End-to-end reconcile scenarios against a scripted investigation service.
//!
//! Each test drives a record through the reconciler one step at a time,
//! exactly as the controller would, but without waiting out backoff delays.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use analysis_reconciler::investigation::wire::{WireRootCause, WireWorkflow};
use analysis_reconciler::investigation::{
    InvestigationRequest, InvestigationResponse, TransportResult,
};
use analysis_reconciler::policy::{
    PolicyEngine, PolicyError, PolicyEvaluator, PolicyInput, PolicyOutput, PolicySource,
    RulePolicyEngine,
};
use analysis_reconciler::types::{
    ConfidenceLevel, EnrichmentResults, PreviousExecution, ResourceIdentifier, SignalContext,
};
use analysis_reconciler::{
    AnalysisRecord, AnalysisRequest, ApprovalOutcome, BackoffPolicy, BroadcastAuditSink,
    FailureSubReason, InMemoryRecordStore, InvestigationClient, InvestigationError,
    InvestigationTransport, Phase, ReconcileAction, Reconciler, RecordStore,
};

/// Investigation transport that replays a script and records every request.
struct ScriptedTransport {
    script: Mutex<VecDeque<TransportResult<InvestigationResponse>>>,
    requests: Mutex<Vec<InvestigationRequest>>,
}

impl ScriptedTransport {
    fn new(script: Vec<TransportResult<InvestigationResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<InvestigationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InvestigationTransport for ScriptedTransport {
    async fn send(
        &self,
        request: &InvestigationRequest,
    ) -> TransportResult<InvestigationResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(InvestigationError::Connection("script exhausted".into())))
    }
}

/// Builtin rule policy that counts how often it is evaluated.
struct CountingPolicy {
    inner: RulePolicyEngine,
    calls: AtomicUsize,
}

impl CountingPolicy {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RulePolicyEngine::builtin(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PolicyEngine for CountingPolicy {
    fn evaluate(&self, input: &PolicyInput) -> Result<PolicyOutput, PolicyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.evaluate(input)
    }
}

struct Harness {
    store: Arc<InMemoryRecordStore>,
    transport: Arc<ScriptedTransport>,
    reconciler: Reconciler,
    audit: Arc<BroadcastAuditSink>,
}

impl Harness {
    fn new(script: Vec<TransportResult<InvestigationResponse>>) -> Self {
        Self::with_evaluator(script, PolicyEvaluator::builtin())
    }

    fn with_evaluator(
        script: Vec<TransportResult<InvestigationResponse>>,
        evaluator: PolicyEvaluator,
    ) -> Self {
        let store = InMemoryRecordStore::new().shared();
        let transport = ScriptedTransport::new(script);
        let client = InvestigationClient::new(transport.clone())
            .with_max_retries(5)
            .with_backoff(BackoffPolicy::new(
                Duration::from_millis(100),
                Duration::from_secs(10),
            ));
        let audit = Arc::new(BroadcastAuditSink::new());
        let reconciler =
            Reconciler::new(store.clone(), client, evaluator).with_audit_sink(audit.clone());
        Self {
            store,
            transport,
            reconciler,
            audit,
        }
    }

    async fn create(&self, id: &str, request: AnalysisRequest) {
        self.store
            .insert(AnalysisRecord::new(id, request))
            .await
            .unwrap();
    }

    /// Reconcile until the reconciler reports nothing more to do.
    async fn run_to_rest(&self, id: &str) -> (AnalysisRecord, Vec<ReconcileAction>) {
        let mut actions = Vec::new();
        for _ in 0..50 {
            let action = self.reconciler.reconcile(id).await.unwrap();
            actions.push(action);
            if action == ReconcileAction::Done {
                break;
            }
        }
        (self.record(id).await, actions)
    }

    async fn record(&self, id: &str) -> AnalysisRecord {
        self.store.get(id).await.unwrap().unwrap()
    }
}

fn request(environment: &str) -> AnalysisRequest {
    AnalysisRequest {
        signal_context: SignalContext {
            fingerprint: "a1b2c3".into(),
            signal_type: "OOMKilled".into(),
            environment: environment.into(),
            business_priority: "P1".into(),
            severity: Some("critical".into()),
            target_resource: ResourceIdentifier {
                kind: "Deployment".into(),
                name: "payment-api".into(),
                namespace: Some("payments".into()),
            },
            enrichment_results: EnrichmentResults::default(),
        },
        ..Default::default()
    }
}

fn response(confidence: f64) -> InvestigationResponse {
    InvestigationResponse {
        analysis: "Container exceeded its memory limit under peak load".into(),
        root_cause_analysis: Some(WireRootCause {
            summary: "Memory limit too low for peak traffic".into(),
            severity: Some("high".into()),
            contributing_factors: vec!["traffic spike".into()],
        }),
        selected_workflow: Some(WireWorkflow {
            workflow_id: "increase-memory-limit".into(),
            container_image: Some("ghcr.io/acme/workflows/memory:1.4.0".into()),
            confidence,
            parameters: [("MEMORY_LIMIT".to_string(), json!("1Gi"))].into(),
            rationale: "OOM pattern matches catalog entry".into(),
        }),
        alternative_workflows: vec![WireWorkflow {
            workflow_id: "restart-deployment".into(),
            confidence: 0.4,
            parameters: [("FORCE".to_string(), json!(true))].into(),
            ..Default::default()
        }],
        confidence,
        target_in_owner_chain: true,
        warnings: Vec::new(),
        needs_human_review: false,
        human_review_reason: None,
    }
}

#[tokio::test]
async fn test_staging_high_confidence_completes_without_approval() {
    let h = Harness::new(vec![Ok(response(0.9))]);
    h.create("a", request("staging")).await;

    let (record, actions) = h.run_to_rest("a").await;

    assert_eq!(record.phase(), Phase::Completed);
    assert!(!record.status.approval_required);
    assert!(record.status.approval_context.is_none());
    assert_eq!(record.status.policy_outcome, Some(ApprovalOutcome::AutoApprove));
    assert!(!record.status.policy_degraded);
    assert_eq!(
        record.status.root_cause.as_deref(),
        Some("Memory limit too low for peak traffic")
    );
    assert_eq!(record.status.confidence, Some(0.9));
    assert_eq!(
        record
            .status
            .selected_workflow
            .as_ref()
            .map(|w| w.workflow_id.as_str()),
        Some("increase-memory-limit")
    );
    assert_eq!(record.status.alternative_workflows.len(), 1);
    assert!(record.status.completed_at.is_some());
    assert_eq!(record.status.transitions.len(), 5);
    assert_eq!(h.transport.calls(), 1);
    assert_eq!(
        actions,
        vec![
            ReconcileAction::Requeue,
            ReconcileAction::Requeue,
            ReconcileAction::Requeue,
            ReconcileAction::Requeue,
            ReconcileAction::Done,
        ]
    );
}

#[tokio::test]
async fn test_production_with_failed_detection_requires_approval() {
    let mut req = request("production");
    req.signal_context.enrichment_results.failed_detections = vec!["gitOpsManaged".into()];
    let h = Harness::new(vec![Ok(response(0.88))]);
    h.create("b", req).await;

    let (record, _) = h.run_to_rest("b").await;

    assert_eq!(record.phase(), Phase::Completed);
    assert!(record.status.approval_required);
    assert!(!record.status.policy_degraded);
    let ctx = record
        .status
        .approval_context
        .as_ref()
        .expect("approval context");
    assert_eq!(ctx.confidence_level, ConfidenceLevel::High);
    assert_eq!(ctx.recommended_workflow.as_deref(), Some("increase-memory-limit"));
    assert!(ctx.rationale.contains("Production"));

    let status = serde_json::to_value(&record.status).unwrap();
    assert_eq!(status["approvalContext"]["confidenceLevel"], "high");
}

#[tokio::test]
async fn test_human_review_fails_preserving_partial_results() {
    let mut resp = response(0.3);
    resp.selected_workflow = None;
    resp.needs_human_review = true;
    resp.human_review_reason = Some("no_matching_workflows".into());
    let h = Harness::new(vec![Ok(resp)]);
    h.create("c", request("staging")).await;

    let (record, _) = h.run_to_rest("c").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(
        record.status.sub_reason,
        Some(FailureSubReason::NoMatchingWorkflows)
    );
    assert!(record
        .status
        .message
        .as_deref()
        .unwrap()
        .contains("no matching workflows"));
    assert!(record.status.selected_workflow.is_none());
    assert_eq!(
        record.status.root_cause.as_deref(),
        Some("Memory limit too low for peak traffic")
    );
    let status = serde_json::to_value(&record.status).unwrap();
    assert!(status["selectedWorkflow"].is_null());
}

#[tokio::test]
async fn test_human_review_reason_from_warnings_when_enum_absent() {
    let mut resp = response(0.3);
    resp.selected_workflow = None;
    resp.needs_human_review = true;
    resp.warnings = vec!["No matching workflows found in catalog".into()];
    let h = Harness::new(vec![Ok(resp)]);
    h.create("c2", request("staging")).await;

    let (record, _) = h.run_to_rest("c2").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(
        record.status.sub_reason,
        Some(FailureSubReason::NoMatchingWorkflows)
    );
}

#[tokio::test]
async fn test_human_review_after_transient_errors_resets_retry_count() {
    let mut resp = response(0.4);
    resp.needs_human_review = true;
    resp.human_review_reason = Some("low_confidence".into());
    let h = Harness::new(vec![
        Err(InvestigationError::api(503, "unavailable")),
        Err(InvestigationError::api(503, "unavailable")),
        Ok(resp),
    ]);
    h.create("c3", request("staging")).await;

    let (record, _) = h.run_to_rest("c3").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(record.status.sub_reason, Some(FailureSubReason::LowConfidence));
    assert_eq!(record.retry_count, 0);
    assert_eq!(h.transport.calls(), 3);
}

#[tokio::test]
async fn test_transient_then_permanent_error() {
    let h = Harness::new(vec![
        Err(InvestigationError::api(503, "unavailable")),
        Err(InvestigationError::api(503, "unavailable")),
        Err(InvestigationError::api(503, "unavailable")),
        Err(InvestigationError::api(401, "unauthorized")),
    ]);
    h.create("d", request("staging")).await;

    let (record, actions) = h.run_to_rest("d").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.status.sub_reason, Some(FailureSubReason::ApiError));
    assert!(record.status.message.as_deref().unwrap().contains("API error"));
    assert_eq!(h.transport.calls(), 4);

    let delays: Vec<Duration> = actions
        .iter()
        .filter_map(|a| match a {
            ReconcileAction::RequeueAfter(d) => Some(*d),
            _ => None,
        })
        .collect();
    assert_eq!(delays.len(), 3);
    for (attempt, delay) in delays.iter().enumerate() {
        let nominal = 100.0 * 2f64.powi(attempt as i32);
        let ms = delay.as_secs_f64() * 1000.0;
        assert!(ms >= nominal * 0.9 - 1.0 && ms <= nominal * 1.1 + 1.0, "{ms} vs {nominal}");
    }
}

#[tokio::test]
async fn test_retried_requests_are_identical() {
    let h = Harness::new(vec![
        Err(InvestigationError::Timeout("deadline".into())),
        Err(InvestigationError::Connection("reset".into())),
        Ok(response(0.9)),
    ]);
    h.create("retry", request("staging")).await;

    let (record, _) = h.run_to_rest("retry").await;

    assert_eq!(record.phase(), Phase::Completed);
    assert_eq!(record.retry_count, 0);
    let requests = h.transport.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_transient_errors_exhaust_retry_budget() {
    let script = (0..10)
        .map(|_| Err(InvestigationError::api(429, "slow down")))
        .collect();
    let h = Harness::new(script);
    h.create("budget", request("staging")).await;

    let (record, _) = h.run_to_rest("budget").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(
        record.status.sub_reason,
        Some(FailureSubReason::MaxRetriesExceeded)
    );
    assert_eq!(record.retry_count, 6);
    // max_retries + 1 attempts in total.
    assert_eq!(h.transport.calls(), 6);
    assert!(record
        .status
        .message
        .as_deref()
        .unwrap()
        .contains("max retries exceeded"));
}

#[tokio::test]
async fn test_permanent_error_keeps_retry_count_zero() {
    let h = Harness::new(vec![Err(InvestigationError::api(400, "bad request"))]);
    h.create("perm", request("staging")).await;

    let (record, _) = h.run_to_rest("perm").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(record.retry_count, 0);
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test]
async fn test_terminal_record_reconcile_is_noop() {
    let policy = CountingPolicy::new();
    let h = Harness::with_evaluator(
        vec![Ok(response(0.9))],
        PolicyEvaluator::new(policy.clone()),
    );
    h.create("e", request("staging")).await;
    let (completed, _) = h.run_to_rest("e").await;
    assert_eq!(completed.phase(), Phase::Completed);

    assert_eq!(policy.calls(), 1);

    let before = serde_json::to_string(&completed.status).unwrap();
    let calls = h.transport.calls();

    for _ in 0..2 {
        assert_eq!(
            h.reconciler.reconcile("e").await.unwrap(),
            ReconcileAction::Done
        );
    }

    let after = h.record("e").await;
    assert_eq!(serde_json::to_string(&after.status).unwrap(), before);
    assert_eq!(after.resource_version, completed.resource_version);
    assert_eq!(h.transport.calls(), calls);
    assert_eq!(policy.calls(), 1);
}

#[tokio::test]
async fn test_missing_policy_degrades_to_manual_approval() {
    let evaluator = PolicyEvaluator::from_source(PolicySource::File(PathBuf::from(
        "/nonexistent/approval.yaml",
    )));
    let h = Harness::with_evaluator(vec![Ok(response(0.95))], evaluator);
    h.create("deg", request("staging")).await;

    let (record, _) = h.run_to_rest("deg").await;

    assert_eq!(record.phase(), Phase::Completed);
    assert!(record.status.approval_required);
    assert!(record.status.policy_degraded);
    assert!(record.status.approval_context.unwrap().policy_degraded);
}

#[tokio::test]
async fn test_policy_reject_fails_record() {
    let policy = r#"
version: "test"
rules:
  - name: no-memory-changes-on-p1
    when:
      business_priority: [P1]
    outcome: reject
    reason: "P1 workloads are changed by hand"
"#;
    let evaluator = PolicyEvaluator::from_source(PolicySource::Inline(policy.into()));
    let h = Harness::with_evaluator(vec![Ok(response(0.95))], evaluator);
    h.create("rej", request("staging")).await;

    let (record, _) = h.run_to_rest("rej").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(record.status.sub_reason, Some(FailureSubReason::PolicyRejected));
    assert_eq!(record.status.policy_version.as_deref(), Some("test"));
    assert!(record
        .status
        .message
        .as_deref()
        .unwrap()
        .contains("changed by hand"));
}

#[tokio::test]
async fn test_no_selected_workflow_fails_in_recommending() {
    let mut resp = response(0.9);
    resp.selected_workflow = None;
    let h = Harness::new(vec![Ok(resp)]);
    h.create("nowf", request("staging")).await;

    let (record, _) = h.run_to_rest("nowf").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(record.status.message.as_deref(), Some("no workflow selected"));
    let last = record.status.transitions.last().unwrap();
    assert_eq!(last.from, Phase::Recommending);
}

#[tokio::test]
async fn test_invalid_input_never_calls_investigation() {
    let mut req = request("staging");
    req.signal_context.enrichment_results.failed_detections = vec!["madeUpDetection".into()];
    let h = Harness::new(vec![Ok(response(0.9))]);
    h.create("bad", req).await;

    let (record, _) = h.run_to_rest("bad").await;

    assert_eq!(record.phase(), Phase::Failed);
    assert_eq!(record.status.sub_reason, Some(FailureSubReason::ValidationError));
    assert!(record
        .status
        .message
        .as_deref()
        .unwrap()
        .contains("madeUpDetection"));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_recovery_attempt_context_reaches_investigation() {
    let mut req = request("staging");
    req.is_recovery_attempt = true;
    req.recovery_attempt_number = Some(2);
    req.previous_executions = vec![PreviousExecution {
        execution_ref: "exec-41".into(),
        workflow_id: Some("restart-deployment".into()),
        failure_reason: Some("pods still crashlooping".into()),
        failed_at: None,
    }];
    let h = Harness::new(vec![Ok(response(0.9))]);
    h.create("rec", req).await;

    let (record, _) = h.run_to_rest("rec").await;
    assert_eq!(record.phase(), Phase::Completed);

    let sent = &h.transport.requests()[0];
    assert!(sent.is_recovery_attempt);
    assert_eq!(sent.recovery_attempt_number, Some(2));
    assert_eq!(
        sent.previous_execution.as_ref().map(|p| p.execution_ref.as_str()),
        Some("exec-41")
    );
    assert!(sent.incident_context.contains("recovery attempt 2"));
    assert!(sent.incident_context.contains("pods still crashlooping"));
}

#[tokio::test]
async fn test_audit_trail_covers_lifecycle() {
    let h = Harness::new(vec![Ok(response(0.9))]);
    let mut events = h.audit.subscribe();
    h.create("audit", request("staging")).await;

    h.run_to_rest("audit").await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.event_type());
    }
    assert_eq!(
        kinds.iter().filter(|k| **k == "phase_transition").count(),
        5
    );
    assert!(kinds.contains(&"investigation_completed"));
    assert!(kinds.contains(&"policy_evaluated"));
    assert_eq!(kinds.last(), Some(&"analysis_completed"));
}

#[tokio::test]
async fn test_record_deleted_between_reconciles_is_benign() {
    let h = Harness::new(vec![Ok(response(0.9))]);
    h.create("gone", request("staging")).await;
    h.reconciler.reconcile("gone").await.unwrap();
    h.store.delete("gone").await.unwrap();

    assert_eq!(
        h.reconciler.reconcile("gone").await.unwrap(),
        ReconcileAction::Done
    );
}
