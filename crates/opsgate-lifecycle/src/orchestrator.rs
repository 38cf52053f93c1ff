//! The plan orchestrator: creation, approval updates, and execution.
//!
//! Execution re-validates everything the creation path validated, plus
//! the strict context check, the approval gate, the pinned hash, and the
//! idempotency guard. The ordering of checks is significant and mirrors
//! the authorization chain: identity (session) before policy, policy
//! before constraints, constraints before approval, approval before
//! integrity, integrity before idempotency.

use crate::approval::{Approval, ApprovalStatus};
use crate::error::{map_policy_error, LifecycleError, StoreError};
use crate::hash::compute_plan_hash;
use crate::store::{Execution, PlanStore};
use async_trait::async_trait;
use chrono::Utc;
use opsgate_audit::AuditLogger;
use opsgate_core::{
    ActionKind, ApprovalConfig, ContextRef, Plan, PlanStep, RiskLevel, RuntimeConstraints,
};
use opsgate_hub::{EventHub, HubEvent};
use opsgate_policy::{
    ActionRef, Decision, KeywordRiskClassifier, PolicyDecision, PolicyEngine, PolicyInput,
    RiskClassifier, RiskContext,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Hands a fully authorized execution off to the workflow engine.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Start executing the steps. Returns the workflow identifier when the
    /// engine produces one.
    async fn start_execution(
        &self,
        plan_id: &str,
        execution_id: &str,
        context: &ContextRef,
        steps: &[PlanStep],
    ) -> anyhow::Result<Option<String>>;
}

/// Opens an external approval issue (e.g. a ticket) for a pending plan.
/// Best-effort side channel: failure does not roll back the approval.
#[async_trait]
pub trait ApprovalIssuer: Send + Sync {
    async fn create_external_issue(&self, plan_id: &str) -> anyhow::Result<String>;
}

/// Request to create a plan from an intent.
#[derive(Debug, Clone, Default)]
pub struct CreatePlanRequest {
    pub actor: String,
    pub session_id: String,
    pub trigger: String,
    pub summary: String,
    pub intent: String,
    /// Risk level fixed by the caller; classified from the intent when
    /// absent.
    pub risk_level: Option<RiskLevel>,
    pub context: ContextRef,
    pub constraints: RuntimeConstraints,
    pub steps: Vec<PlanStep>,
    pub break_glass: bool,
}

/// What creation produced: the persisted plan, the approval record (for
/// write actions), and the decision that let it through.
#[derive(Debug, Clone)]
pub struct CreatePlanOutcome {
    pub plan: Plan,
    pub approval: Option<Approval>,
    pub decision: PolicyDecision,
}

/// Request to execute a previously created plan.
#[derive(Debug, Clone, Default)]
pub struct ExecutePlanRequest {
    pub actor: String,
    pub plan_id: String,
    /// Caller session; must match the plan's session when one was
    /// recorded.
    pub session_id: String,
    /// Single-use approval token, used instead of the plan-scoped
    /// approval status when the store supports tokens.
    pub approval_token: Option<String>,
    pub break_glass: bool,
}

/// The plan/approval/execution state machine.
pub struct PlanOrchestrator {
    store: Arc<dyn PlanStore>,
    engine: Arc<PolicyEngine>,
    executor: Arc<dyn Executor>,
    classifier: Arc<dyn RiskClassifier>,
    issuer: Option<Arc<dyn ApprovalIssuer>>,
    events: Option<Arc<EventHub>>,
    audit: Arc<AuditLogger>,
    approvals: ApprovalConfig,
}

impl PlanOrchestrator {
    pub fn new(
        store: Arc<dyn PlanStore>,
        engine: Arc<PolicyEngine>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            store,
            engine,
            executor,
            classifier: Arc::new(KeywordRiskClassifier),
            issuer: None,
            events: None,
            audit: Arc::new(AuditLogger::disabled()),
            approvals: ApprovalConfig::default(),
        }
    }

    /// Replace the fallback risk classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn RiskClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Attach the external approval issuer.
    pub fn with_issuer(mut self, issuer: Arc<dyn ApprovalIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Attach the event hub lifecycle notifications are published on.
    pub fn with_events(mut self, events: Arc<EventHub>) -> Self {
        self.events = Some(events);
        self
    }

    /// Attach the audit logger.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Set the approval workflow configuration.
    pub fn with_approval_config(mut self, config: ApprovalConfig) -> Self {
        self.approvals = config;
        self
    }

    /// Create a plan from an intent.
    ///
    /// Validates the minimal context, classifies risk, renders a policy
    /// decision, persists the plan, and for write actions creates either
    /// an auto-approved approval (low risk, auto-approve on, decision not
    /// `require_approval`) or a pending one.
    pub async fn create_plan(
        &self,
        req: CreatePlanRequest,
    ) -> Result<CreatePlanOutcome, LifecycleError> {
        req.context.validate_minimal()?;

        let risk = req
            .risk_level
            .unwrap_or_else(|| self.classifier.classify(&req.intent));
        let kind = ActionKind::from_risk(risk);

        let plan = Plan {
            plan_id: Uuid::new_v4().to_string(),
            session_id: req.session_id.clone(),
            trigger: req.trigger.clone(),
            summary: req.summary.clone(),
            intent: req.intent.clone(),
            risk_level: Some(risk),
            context: req.context.clone(),
            constraints: req.constraints.clone(),
            steps: req.steps.clone(),
            created_at: Utc::now(),
        };
        let action = primary_action(&plan.steps);

        let decision = self
            .engine
            .decide(&PolicyInput {
                actor: req.actor.clone(),
                action: ActionRef {
                    name: action.clone(),
                    kind,
                },
                context: plan.context.clone(),
                risk: RiskContext {
                    level: risk,
                    target_count: plan.steps.len() as i64,
                },
                break_glass: req.break_glass,
            })
            .await
            .map_err(map_policy_error)?;

        if kind == ActionKind::Write {
            self.record_policy_check(&req.actor, &plan, &action, &decision)
                .await;
        }

        match decision.decision {
            Decision::Allow => {}
            // An approval requirement only makes sense for writes; for a
            // read it is a denial.
            Decision::RequireApproval if kind == ActionKind::Write => {}
            Decision::RequireApproval => {
                return Err(self
                    .deny(
                        &req.actor,
                        &plan,
                        &action,
                        "approval requirement is not applicable to read actions".to_string(),
                    )
                    .await);
            }
            ref other => {
                return Err(self
                    .deny(
                        &req.actor,
                        &plan,
                        &action,
                        format!("policy denied plan creation (decision: {})", other),
                    )
                    .await);
            }
        }

        self.store.create_plan(&plan).await?;
        tracing::info!(
            plan_id = %plan.plan_id,
            actor = %req.actor,
            risk = %risk,
            decision = %decision.decision,
            "plan created"
        );
        if let Err(err) = self
            .audit
            .log_plan_created(&req.actor, &plan.context.tenant, &action, &plan.plan_id)
            .await
        {
            tracing::warn!(error = %err, "failed to write audit record");
        }
        self.publish(
            HubEvent::new("plan.created", &plan.session_id)
                .with_plan(&plan.plan_id)
                .with_payload(json!({"risk": risk, "decision": decision.decision.clone()})),
        );

        let approval = if kind == ActionKind::Write {
            Some(self.open_approval(&req.actor, &plan, &action, &decision).await?)
        } else {
            None
        };

        Ok(CreatePlanOutcome {
            plan,
            approval,
            decision,
        })
    }

    /// Create the approval record for a freshly persisted write plan.
    async fn open_approval(
        &self,
        actor: &str,
        plan: &Plan,
        action: &str,
        decision: &PolicyDecision,
    ) -> Result<Approval, LifecycleError> {
        let auto = plan.risk_level == Some(RiskLevel::Low)
            && self.approvals.auto_approve_low_risk
            && decision.decision != Decision::RequireApproval;

        if auto {
            let hash = compute_plan_hash(&plan.intent, &plan.steps)?;
            let approval = Approval::approved(&plan.plan_id, hash.clone(), "auto");
            self.store.create_approval(&approval).await?;
            if let Some(hashes) = self.store.hash_store() {
                hashes.put_hash(&plan.plan_id, &hash).await?;
            }
            if let Err(err) = self
                .audit
                .log_approval_decided(actor, &plan.context.tenant, action, &plan.plan_id, true, "auto")
                .await
            {
                tracing::warn!(error = %err, "failed to write audit record");
            }
            return Ok(approval);
        }

        let approval = Approval::pending(&plan.plan_id);
        self.store.create_approval(&approval).await?;
        if let Err(err) = self
            .audit
            .log_approval_requested(actor, &plan.context.tenant, action, &plan.plan_id)
            .await
        {
            tracing::warn!(error = %err, "failed to write audit record");
        }

        if self.approvals.external_issues {
            if let Some(issuer) = &self.issuer {
                // The approval record above survives an issuer failure.
                if let Err(err) = issuer.create_external_issue(&plan.plan_id).await {
                    tracing::warn!(
                        plan_id = %plan.plan_id,
                        error = %err,
                        "failed to open external approval issue"
                    );
                    return Err(LifecycleError::Gateway(err.to_string()));
                }
            }
        }

        Ok(approval)
    }

    /// Update a plan's approval status.
    ///
    /// Approving pins the plan's content at this moment: the hash is
    /// computed from the steps as they are now, not as they were at
    /// creation.
    pub async fn update_approval(
        &self,
        plan_id: &str,
        status: &str,
        actor: &str,
    ) -> Result<Approval, LifecycleError> {
        let status = ApprovalStatus::normalize(status)?;
        let plan = self
            .store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| LifecycleError::PlanNotFound(plan_id.to_string()))?;
        let mut approval = self
            .store
            .get_approval(plan_id)
            .await?
            .ok_or_else(|| LifecycleError::ApprovalNotFound(plan_id.to_string()))?;

        approval.status = status;
        if status != ApprovalStatus::Pending {
            approval.decided_by = Some(actor.to_string());
            approval.decided_at = Some(Utc::now());
        }
        if status == ApprovalStatus::Approved {
            let hash = compute_plan_hash(&plan.intent, &plan.steps)?;
            approval.approval_hash = Some(hash.clone());
            if let Some(hashes) = self.store.hash_store() {
                hashes.put_hash(plan_id, &hash).await?;
            }
        }
        self.store.update_approval(&approval).await?;

        let action = primary_action(&plan.steps);
        match status {
            ApprovalStatus::Approved | ApprovalStatus::Denied => {
                if let Err(err) = self
                    .audit
                    .log_approval_decided(
                        actor,
                        &plan.context.tenant,
                        &action,
                        plan_id,
                        status == ApprovalStatus::Approved,
                        actor,
                    )
                    .await
                {
                    tracing::warn!(error = %err, "failed to write audit record");
                }
            }
            _ => {}
        }
        self.publish(
            HubEvent::new("approval.updated", &plan.session_id)
                .with_plan(plan_id)
                .with_payload(json!({"status": approval.status})),
        );

        Ok(approval)
    }

    /// Execute an approved plan.
    pub async fn execute_plan(&self, req: ExecutePlanRequest) -> Result<Execution, LifecycleError> {
        let plan = self
            .store
            .get_plan(&req.plan_id)
            .await?
            .ok_or_else(|| LifecycleError::PlanNotFound(req.plan_id.clone()))?;
        let action = primary_action(&plan.steps);

        if !plan.session_id.is_empty() && plan.session_id != req.session_id {
            return Err(self
                .deny(
                    &req.actor,
                    &plan,
                    &action,
                    "caller session does not match the plan's session".to_string(),
                )
                .await);
        }

        let risk = plan
            .risk_level
            .unwrap_or_else(|| self.classifier.classify(&plan.intent));
        let kind = ActionKind::from_risk(risk);

        plan.context.validate_strict()?;

        let steps = self.gather_steps(&plan).await?;

        let decision = self
            .engine
            .decide(&PolicyInput {
                actor: req.actor.clone(),
                action: ActionRef {
                    name: action.clone(),
                    kind,
                },
                context: plan.context.clone(),
                risk: RiskContext {
                    level: risk,
                    target_count: steps.len() as i64,
                },
                break_glass: req.break_glass,
            })
            .await
            .map_err(map_policy_error)?;

        if kind == ActionKind::Write {
            self.record_policy_check(&req.actor, &plan, &action, &decision)
                .await;
        }

        match decision.decision {
            Decision::Allow => {}
            // Writes fall through to the approval gate below.
            Decision::RequireApproval if kind == ActionKind::Write => {}
            Decision::RequireApproval => {
                return Err(self
                    .deny(
                        &req.actor,
                        &plan,
                        &action,
                        "approval requirement is not applicable to read actions".to_string(),
                    )
                    .await);
            }
            ref other => {
                return Err(self
                    .deny(
                        &req.actor,
                        &plan,
                        &action,
                        format!("policy denied execution (decision: {})", other),
                    )
                    .await);
            }
        }

        // Runtime constraints deny independently of the policy decision.
        let mut constraints = plan.constraints.clone();
        if let Ok(extra) =
            serde_json::from_value::<RuntimeConstraints>(decision.constraints.clone())
        {
            constraints = constraints.merge(&extra);
        }
        if let Err(violation) = constraints.check(&steps, &plan.context) {
            return Err(self
                .deny(
                    &req.actor,
                    &plan,
                    &action,
                    format!("constraints violation: {}", violation),
                )
                .await);
        }

        if kind == ActionKind::Write {
            let approval = self.resolve_approval(&req, &plan).await?;
            match &approval {
                None => {
                    return Err(self
                        .deny(
                            &req.actor,
                            &plan,
                            &action,
                            "no approval exists for this plan".to_string(),
                        )
                        .await);
                }
                Some(approval) if approval.plan_id != plan.plan_id => {
                    return Err(self
                        .deny(
                            &req.actor,
                            &plan,
                            &action,
                            "approval does not belong to this plan".to_string(),
                        )
                        .await);
                }
                Some(approval) if !approval.is_approved() => {
                    return Err(self
                        .deny(
                            &req.actor,
                            &plan,
                            &action,
                            format!("plan is not approved (status: {})", approval.status),
                        )
                        .await);
                }
                Some(_) => {}
            }

            // Tamper detection: the content being executed must match the
            // content that was approved.
            let pinned = match self.store.hash_store() {
                Some(hashes) => hashes
                    .get_hash(&plan.plan_id)
                    .await?
                    .or_else(|| approval.as_ref().and_then(|a| a.approval_hash.clone())),
                None => approval.as_ref().and_then(|a| a.approval_hash.clone()),
            };
            if let Some(pinned) = pinned {
                let current = compute_plan_hash(&plan.intent, &steps)?;
                if current != pinned {
                    if let Err(err) = self
                        .audit
                        .log_authorization_denied(
                            &req.actor,
                            &plan.context.tenant,
                            &action,
                            &plan.plan_id,
                            "plan modified after approval",
                        )
                        .await
                    {
                        tracing::warn!(error = %err, "failed to write audit record");
                    }
                    return Err(LifecycleError::PlanModified);
                }
            }
        }

        // Idempotency: never start a second concurrent execution.
        if let Some(probe) = self.store.execution_probe() {
            if probe.has_active_execution(&plan.plan_id).await? {
                return Err(self.conflict(&req.actor, &plan, &action).await);
            }
        }

        let mut execution = Execution::new(&plan.plan_id);
        match self.store.create_execution(&execution).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(self.conflict(&req.actor, &plan, &action).await);
            }
            Err(err) => return Err(err.into()),
        }

        let workflow_id = self
            .executor
            .start_execution(&plan.plan_id, &execution.execution_id, &plan.context, &steps)
            .await
            .map_err(LifecycleError::Executor)?;
        if let Some(workflow_id) = workflow_id {
            if let Some(binder) = self.store.workflow_binder() {
                binder
                    .bind_workflow(&execution.execution_id, &workflow_id)
                    .await?;
            }
            execution.workflow_id = Some(workflow_id);
        }

        tracing::info!(
            plan_id = %plan.plan_id,
            execution_id = %execution.execution_id,
            workflow_id = execution.workflow_id.as_deref().unwrap_or(""),
            "execution started"
        );
        if let Err(err) = self
            .audit
            .log_execution_started(
                &req.actor,
                &plan.context.tenant,
                &action,
                &plan.plan_id,
                &execution.execution_id,
            )
            .await
        {
            tracing::warn!(error = %err, "failed to write audit record");
        }
        self.publish(
            HubEvent::new("execution.updated", &plan.session_id)
                .with_plan(&plan.plan_id)
                .with_execution(&execution.execution_id)
                .with_payload(json!({"workflow_id": execution.workflow_id.clone()})),
        );

        Ok(execution)
    }

    /// Steps to execute: the plan body, or the step-listing capability
    /// when the body carries none.
    async fn gather_steps(&self, plan: &Plan) -> Result<Vec<PlanStep>, LifecycleError> {
        if !plan.steps.is_empty() {
            return Ok(plan.steps.clone());
        }
        match self.store.step_lister() {
            Some(lister) => Ok(lister.list_steps(&plan.plan_id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// The approval gating this execution: resolved through the single-use
    /// token when one was supplied and the store supports tokens, the
    /// plan-scoped record otherwise.
    async fn resolve_approval(
        &self,
        req: &ExecutePlanRequest,
        plan: &Plan,
    ) -> Result<Option<Approval>, LifecycleError> {
        if let (Some(token), Some(tokens)) = (&req.approval_token, self.store.token_store()) {
            return Ok(tokens.consume_token(token).await?);
        }
        Ok(self.store.get_approval(&plan.plan_id).await?)
    }

    async fn record_policy_check(
        &self,
        actor: &str,
        plan: &Plan,
        action: &str,
        decision: &PolicyDecision,
    ) {
        if let Err(err) = self
            .audit
            .log_policy_checked(
                actor,
                &plan.context.tenant,
                action,
                &plan.plan_id,
                &decision.decision.to_string(),
                None,
            )
            .await
        {
            tracing::warn!(error = %err, "failed to write audit record");
        }
    }

    /// Audit and build a terminal denial.
    async fn deny(&self, actor: &str, plan: &Plan, action: &str, reason: String) -> LifecycleError {
        tracing::warn!(plan_id = %plan.plan_id, actor, %reason, "authorization denied");
        if let Err(err) = self
            .audit
            .log_authorization_denied(actor, &plan.context.tenant, action, &plan.plan_id, &reason)
            .await
        {
            tracing::warn!(error = %err, "failed to write audit record");
        }
        LifecycleError::Denied { reason }
    }

    /// Audit and build an idempotency conflict.
    async fn conflict(&self, actor: &str, plan: &Plan, action: &str) -> LifecycleError {
        tracing::warn!(plan_id = %plan.plan_id, actor, "execution already active");
        if let Err(err) = self
            .audit
            .log_execution_conflict(actor, &plan.context.tenant, action, &plan.plan_id)
            .await
        {
            tracing::warn!(error = %err, "failed to write audit record");
        }
        LifecycleError::Conflict {
            plan_id: plan.plan_id.clone(),
        }
    }

    fn publish(&self, event: HubEvent) {
        if let Some(events) = &self.events {
            let session = event.session_id.clone();
            events.publish(&event, &session);
        }
    }
}

/// The action name used for policy input and audit records: the first
/// step's action, or a generic label for step-less plans.
fn primary_action(steps: &[PlanStep]) -> String {
    steps
        .first()
        .map(|step| step.action.clone())
        .unwrap_or_else(|| "plan".to_string())
}
