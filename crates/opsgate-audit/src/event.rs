//! Audit event types.
//!
//! Structured events for the plan authorization lifecycle, following the
//! format: [actor - tenant - action - decision].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // ===== Plan lifecycle =====
    /// A plan was created from an intent.
    PlanCreated,
    /// The policy engine rendered a decision for a mutating action.
    PolicyChecked,

    // ===== Approval workflow =====
    /// A plan requires human approval.
    ApprovalRequested,
    /// A plan was approved.
    Approved,
    /// A plan was denied.
    Denied,

    // ===== Execution =====
    /// An execution was handed off to the executor.
    ExecutionStarted,
    /// An execution was refused because one is already active.
    ExecutionConflict,
    /// An authorization check refused a request.
    AuthorizationDenied,

    // ===== Event gate =====
    /// A webhook event was suppressed by the dedup gate.
    EventSuppressed,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlanCreated => write!(f, "PLAN_CREATED"),
            Self::PolicyChecked => write!(f, "POLICY_CHECKED"),
            Self::ApprovalRequested => write!(f, "APPROVAL_REQUESTED"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Denied => write!(f, "DENIED"),
            Self::ExecutionStarted => write!(f, "EXECUTION_STARTED"),
            Self::ExecutionConflict => write!(f, "EXECUTION_CONFLICT"),
            Self::AuthorizationDenied => write!(f, "AUTHZ_DENIED"),
            Self::EventSuppressed => write!(f, "EVENT_SUPPRESSED"),
        }
    }
}

/// An audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: Uuid,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Event type.
    pub event_type: AuditEventType,

    // ===== Core fields: [actor - tenant - action - decision] =====
    /// Who initiated the request.
    pub actor: String,

    /// Tenant the action is scoped to.
    pub tenant: String,

    /// Action name (e.g. "scale-deployment", "rotate-secret").
    pub action: String,

    /// The rendered decision, if this event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    /// Free-text reason for a denial or decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    // ===== Correlation =====
    /// Plan the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    /// Execution the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,

    /// Who approved/denied (for Approved/Denied events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,

    // ===== Details =====
    /// Duration in milliseconds, for execution events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl AuditEvent {
    /// Create a new audit event with the given type and core fields.
    pub fn new(
        event_type: AuditEventType,
        actor: impl Into<String>,
        tenant: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type,
            actor: actor.into(),
            tenant: tenant.into(),
            action: action.into(),
            decision: None,
            reason: None,
            plan_id: None,
            execution_id: None,
            approver: None,
            duration_ms: None,
            meta: serde_json::Value::Null,
        }
    }

    /// Create a builder for an audit event.
    pub fn builder(
        event_type: AuditEventType,
        actor: impl Into<String>,
        tenant: impl Into<String>,
        action: impl Into<String>,
    ) -> AuditEventBuilder {
        AuditEventBuilder {
            event: AuditEvent::new(event_type, actor, tenant, action),
        }
    }

    /// Format the event as a human-readable log line.
    ///
    /// Format: `[timestamp] EVENT_TYPE actor=... tenant=... action=... [decision=...]`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} actor={} tenant={} action={}",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.event_type,
            self.actor,
            self.tenant,
            self.action,
        );

        if let Some(ref decision) = self.decision {
            line.push_str(&format!(" decision={}", decision));
        }
        if let Some(ref plan_id) = self.plan_id {
            line.push_str(&format!(" plan_id={}", plan_id));
        }
        if let Some(ref execution_id) = self.execution_id {
            line.push_str(&format!(" execution_id={}", execution_id));
        }
        if let Some(ref approver) = self.approver {
            line.push_str(&format!(" approver={}", approver));
        }
        if let Some(duration) = self.duration_ms {
            line.push_str(&format!(" duration_ms={}", duration));
        }
        if let Some(ref reason) = self.reason {
            line.push_str(&format!(" reason=\"{}\"", reason.replace('"', "'")));
        }

        line
    }
}

/// Builder for creating audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    /// Set the decision.
    pub fn decision(mut self, decision: impl Into<String>) -> Self {
        self.event.decision = Some(decision.into());
        self
    }

    /// Set the reason.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.event.reason = Some(reason.into());
        self
    }

    /// Set the plan ID.
    pub fn plan_id(mut self, id: impl Into<String>) -> Self {
        self.event.plan_id = Some(id.into());
        self
    }

    /// Set the execution ID.
    pub fn execution_id(mut self, id: impl Into<String>) -> Self {
        self.event.execution_id = Some(id.into());
        self
    }

    /// Set the approver.
    pub fn approver(mut self, approver: impl Into<String>) -> Self {
        self.event.approver = Some(approver.into());
        self
    }

    /// Set the duration in milliseconds.
    pub fn duration_ms(mut self, duration: u64) -> Self {
        self.event.duration_ms = Some(duration);
        self
    }

    /// Set additional metadata.
    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.event.meta = meta;
        self
    }

    /// Build the audit event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}
