//! End-to-end scenarios for the plan -> approval -> execution lifecycle.

use async_trait::async_trait;
use opsgate_core::{ActionKind, ApprovalConfig, ContextRef, PlanStep, PolicyConfig, RiskLevel};
use opsgate_hub::EventHub;
use opsgate_lifecycle::{
    ApprovalIssuer, CreatePlanRequest, ExecutePlanRequest, Executor, LifecycleError, MemoryStore,
    PlanOrchestrator, PlanStore,
};
use opsgate_policy::{Decision, PolicyChecker, PolicyDecision, PolicyEngine, PolicyHandle, PolicyInput};
use serde_json::json;
use std::sync::{Arc, Mutex};

struct AllowChecker;

#[async_trait]
impl PolicyChecker for AllowChecker {
    async fn evaluate(&self, _input: &PolicyInput) -> anyhow::Result<PolicyDecision> {
        Ok(PolicyDecision::allow())
    }
}

#[derive(Default)]
struct RecordingExecutor {
    started: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn start_execution(
        &self,
        plan_id: &str,
        execution_id: &str,
        _context: &ContextRef,
        steps: &[PlanStep],
    ) -> anyhow::Result<Option<String>> {
        self.started.lock().unwrap().push((
            plan_id.to_string(),
            execution_id.to_string(),
            steps.len(),
        ));
        Ok(Some("wf-1".to_string()))
    }
}

struct FailingIssuer;

#[async_trait]
impl ApprovalIssuer for FailingIssuer {
    async fn create_external_issue(&self, _plan_id: &str) -> anyhow::Result<String> {
        anyhow::bail!("issue tracker unavailable")
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    executor: Arc<RecordingExecutor>,
    orchestrator: PlanOrchestrator,
}

fn harness(approvals: ApprovalConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let engine = Arc::new(
        PolicyEngine::new(Arc::new(PolicyHandle::new(PolicyConfig::default())))
            .with_checker(Arc::new(AllowChecker)),
    );
    let orchestrator = PlanOrchestrator::new(
        store.clone() as Arc<dyn PlanStore>,
        engine,
        executor.clone(),
    )
    .with_approval_config(approvals);
    Harness {
        store,
        executor,
        orchestrator,
    }
}

fn auto_approve() -> ApprovalConfig {
    ApprovalConfig {
        auto_approve_low_risk: true,
        ..Default::default()
    }
}

fn full_context(environment: &str) -> ContextRef {
    ContextRef {
        tenant: "acme".into(),
        environment: environment.into(),
        cluster: "east-1".into(),
        namespace: "payments".into(),
        account: "123456789".into(),
        region: "us-east-1".into(),
        project: "payments".into(),
        org: "1".into(),
    }
}

fn restart_request(environment: &str) -> CreatePlanRequest {
    let mut step = PlanStep::new("rollout-restart", "kubectl");
    step.input = json!({"deployment": "api"});
    CreatePlanRequest {
        actor: "alice".into(),
        session_id: "sess-1".into(),
        trigger: "operator".into(),
        summary: "restart the api deployment".into(),
        intent: "restart the api pods".into(),
        risk_level: Some(RiskLevel::Low),
        context: full_context(environment),
        steps: vec![step],
        ..Default::default()
    }
}

fn execute_request(plan_id: &str) -> ExecutePlanRequest {
    ExecutePlanRequest {
        actor: "alice".into(),
        plan_id: plan_id.into(),
        session_id: "sess-1".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn low_risk_auto_approved_plan_executes() {
    let h = harness(auto_approve());

    let outcome = h
        .orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap();
    let approval = outcome.approval.expect("write plans get an approval");
    assert!(approval.is_approved());
    assert_eq!(approval.decided_by.as_deref(), Some("auto"));
    let hash = approval.approval_hash.expect("auto-approval pins a hash");
    assert_eq!(hash.len(), 64);

    let execution = h
        .orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap();
    assert_eq!(execution.plan_id, outcome.plan.plan_id);
    assert_eq!(execution.workflow_id.as_deref(), Some("wf-1"));

    let started = h.executor.started.lock().unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].0, outcome.plan.plan_id);
    assert_eq!(started[0].2, 1);
}

#[tokio::test]
async fn mutated_steps_are_caught_by_the_pinned_hash() {
    let h = harness(auto_approve());

    let outcome = h
        .orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap();

    // Tamper with the stored plan between approval and execution.
    let mut tampered = outcome.plan.clone();
    tampered.steps[0].input = json!({"deployment": "payments-db"});
    h.store.create_plan(&tampered).await.unwrap();

    let err = h
        .orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::PlanModified));
    assert!(h.executor.started.lock().unwrap().is_empty());
}

#[tokio::test]
async fn high_risk_execution_without_break_glass_is_denied() {
    let h = harness(ApprovalConfig::default());

    let mut req = restart_request("staging");
    req.intent = "rotate the database credentials".into();
    req.risk_level = Some(RiskLevel::High);
    // Creation itself needs the override to get past the break-glass rule.
    req.break_glass = true;
    let outcome = h.orchestrator.create_plan(req).await.unwrap();
    assert!(!outcome.approval.as_ref().unwrap().is_approved());

    h.orchestrator
        .update_approval(&outcome.plan.plan_id, "approved", "admin")
        .await
        .unwrap();

    // Approved or not, executing without the override is denied.
    let err = h
        .orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap_err();
    match err {
        LifecycleError::Denied { reason } => assert!(reason.contains("deny"), "{}", reason),
        other => panic!("expected denial, got {:?}", other),
    }

    // With the override the approved plan runs.
    let mut exec = execute_request(&outcome.plan.plan_id);
    exec.break_glass = true;
    h.orchestrator.execute_plan(exec).await.unwrap();
}

#[tokio::test]
async fn concurrent_executions_conflict() {
    let h = harness(auto_approve());
    let outcome = h
        .orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap();
    let plan_id = outcome.plan.plan_id;

    let (a, b) = tokio::join!(
        h.orchestrator.execute_plan(execute_request(&plan_id)),
        h.orchestrator.execute_plan(execute_request(&plan_id)),
    );

    let oks = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(oks, 1, "exactly one execution may start");
    let conflict = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(conflict, LifecycleError::Conflict { .. }));
    assert!(conflict.is_retriable());
    assert_eq!(h.executor.started.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn prod_writes_wait_for_manual_approval() {
    let h = harness(auto_approve());

    // The checker allows, but prod escalates to require_approval, which
    // disables the auto-approve shortcut.
    let outcome = h
        .orchestrator
        .create_plan(restart_request("prod"))
        .await
        .unwrap();
    let approval = outcome.approval.unwrap();
    assert!(!approval.is_approved());
    assert_eq!(outcome.decision.decision, Decision::RequireApproval);

    let err = h
        .orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap_err();
    match err {
        LifecycleError::Denied { reason } => assert!(reason.contains("not approved")),
        other => panic!("expected denial, got {:?}", other),
    }

    h.orchestrator
        .update_approval(&outcome.plan.plan_id, "approved", "admin")
        .await
        .unwrap();
    h.orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn read_plans_skip_the_approval_workflow() {
    let h = harness(ApprovalConfig::default());

    let mut req = restart_request("staging");
    req.intent = "list the pods in payments".into();
    req.risk_level = Some(RiskLevel::Read);
    req.steps[0].action = "list-pods".into();

    let outcome = h.orchestrator.create_plan(req).await.unwrap();
    assert!(outcome.approval.is_none());

    h.orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn approval_token_is_single_use() {
    let h = harness(ApprovalConfig::default());
    let outcome = h
        .orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap();
    let plan_id = outcome.plan.plan_id;

    h.orchestrator
        .update_approval(&plan_id, "approved", "admin")
        .await
        .unwrap();
    h.store.issue_token("tok-1", &plan_id);

    let mut exec = execute_request(&plan_id);
    exec.approval_token = Some("tok-1".into());
    let execution = h.orchestrator.execute_plan(exec.clone()).await.unwrap();

    // Release the idempotency slot; the consumed token must still refuse.
    h.store.finish_execution(&execution.execution_id);
    let err = h.orchestrator.execute_plan(exec).await.unwrap_err();
    match err {
        LifecycleError::Denied { reason } => assert!(reason.contains("no approval")),
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn execution_is_pinned_to_the_creating_session() {
    let h = harness(auto_approve());
    let outcome = h
        .orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap();

    let mut exec = execute_request(&outcome.plan.plan_id);
    exec.session_id = "someone-else".into();
    let err = h.orchestrator.execute_plan(exec).await.unwrap_err();
    match err {
        LifecycleError::Denied { reason } => assert!(reason.contains("session")),
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn execution_requires_the_full_context() {
    let h = harness(auto_approve());
    let mut req = restart_request("staging");
    req.context.region.clear();

    // Creation only needs tenant and environment.
    let outcome = h.orchestrator.create_plan(req).await.unwrap();

    let err = h
        .orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));
}

#[tokio::test]
async fn constraint_violations_deny_independently() {
    let h = harness(auto_approve());
    let mut req = restart_request("staging");
    req.steps.push(PlanStep::new("verify-rollout", "kubectl"));
    req.constraints.max_targets = Some(1);

    let outcome = h.orchestrator.create_plan(req).await.unwrap();
    assert!(outcome.approval.unwrap().is_approved());

    let err = h
        .orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap_err();
    match err {
        LifecycleError::Denied { reason } => assert!(reason.contains("constraints violation")),
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn issuer_failure_is_a_gateway_error_but_the_approval_survives() {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let engine = Arc::new(
        PolicyEngine::new(Arc::new(PolicyHandle::new(PolicyConfig::default())))
            .with_checker(Arc::new(AllowChecker)),
    );
    let orchestrator = PlanOrchestrator::new(
        store.clone() as Arc<dyn PlanStore>,
        engine,
        executor,
    )
    .with_approval_config(ApprovalConfig {
        external_issues: true,
        ..Default::default()
    })
    .with_issuer(Arc::new(FailingIssuer));

    let err = orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Gateway(_)));

    // The plan and its pending approval were persisted before the issuer
    // failed.
    let plans = store.list_plans().await.unwrap();
    assert_eq!(plans.len(), 1);
    let approval = store.get_approval(&plans[0].plan_id).await.unwrap().unwrap();
    assert!(!approval.is_approved());
}

#[tokio::test]
async fn lifecycle_events_reach_session_subscribers() {
    let events = Arc::new(EventHub::new());
    let (mut rx, _sub) = events.subscribe("sess-1");

    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let engine = Arc::new(
        PolicyEngine::new(Arc::new(PolicyHandle::new(PolicyConfig::default())))
            .with_checker(Arc::new(AllowChecker)),
    );
    let orchestrator = PlanOrchestrator::new(
        store.clone() as Arc<dyn PlanStore>,
        engine,
        executor,
    )
    .with_approval_config(auto_approve())
    .with_events(events.clone());

    let outcome = orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap();
    orchestrator
        .execute_plan(execute_request(&outcome.plan.plan_id))
        .await
        .unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.kind, "plan.created");
    assert_eq!(created.plan_id.as_deref(), Some(outcome.plan.plan_id.as_str()));

    let updated = rx.recv().await.unwrap();
    assert_eq!(updated.kind, "execution.updated");
    assert!(updated.execution_id.is_some());
}

#[tokio::test]
async fn no_checker_makes_writes_a_config_error() {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let engine = Arc::new(PolicyEngine::new(Arc::new(PolicyHandle::new(
        PolicyConfig::default(),
    ))));
    let orchestrator =
        PlanOrchestrator::new(store as Arc<dyn PlanStore>, engine, executor);

    let err = orchestrator
        .create_plan(restart_request("staging"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Config(_)));
}

#[tokio::test]
async fn read_classification_falls_back_to_the_intent() {
    // No risk level on the request: the keyword classifier sees a read.
    let h = harness(ApprovalConfig::default());
    let mut req = restart_request("staging");
    req.intent = "show the status of the api rollout".into();
    req.risk_level = None;

    let outcome = h.orchestrator.create_plan(req).await.unwrap();
    assert_eq!(outcome.plan.risk_level, Some(RiskLevel::Read));
    assert_eq!(
        ActionKind::from_risk(outcome.plan.risk_level.unwrap()),
        ActionKind::Read
    );
    assert!(outcome.approval.is_none());
}
