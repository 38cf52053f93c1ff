//! Audit logger implementation.
//!
//! Provides the main `AuditLogger` type with helper methods for recording
//! plan creation, policy decisions, approval workflow events, and
//! execution events.

use opsgate_core::AuditConfig;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AuditError;
use crate::event::{AuditEvent, AuditEventType};
use crate::storage::{AuditStorage, ConsoleStorage, FileStorage, NullStorage};

/// The main audit logger.
///
/// Provides convenient methods for logging the event types of the plan
/// authorization lifecycle following the [actor - tenant - action -
/// decision] format.
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    /// Create a new audit logger with the given configuration.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let storage: Arc<dyn AuditStorage> = if !config.enabled {
            Arc::new(NullStorage)
        } else if config.stdout {
            Arc::new(ConsoleStorage)
        } else {
            Arc::new(FileStorage::new(Self::resolve_log_path(&config))?)
        };

        Ok(Self { config, storage })
    }

    /// Create a logger with a custom storage backend.
    pub fn with_storage(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        Self { config, storage }
    }

    /// Create a disabled (no-op) logger.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            storage: Arc::new(NullStorage),
        }
    }

    fn resolve_log_path(config: &AuditConfig) -> PathBuf {
        let mut path = PathBuf::from(&config.directory);
        path.push("audit.log");
        path
    }

    /// Check if logging is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Log an audit event.
    pub async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if !self.config.enabled {
            return Ok(());
        }

        // Also emit to tracing for structured logging integration
        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            actor = %event.actor,
            tenant = %event.tenant,
            action = %event.action,
            "audit event"
        );

        self.storage.store(event).await
    }

    /// Log plan creation.
    pub async fn log_plan_created(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::PlanCreated, actor, tenant, action)
            .plan_id(plan_id)
            .build();
        self.log(event).await
    }

    /// Log a policy decision on a mutating action.
    pub async fn log_policy_checked(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
        decision: &str,
        reason: Option<&str>,
    ) -> Result<(), AuditError> {
        let mut builder = AuditEvent::builder(AuditEventType::PolicyChecked, actor, tenant, action)
            .plan_id(plan_id)
            .decision(decision);
        if let Some(reason) = reason {
            builder = builder.reason(reason);
        }
        self.log(builder.build()).await
    }

    /// Log that a plan requires human approval.
    pub async fn log_approval_requested(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::ApprovalRequested, actor, tenant, action)
            .plan_id(plan_id)
            .build();
        self.log(event).await
    }

    /// Log an approval decision.
    pub async fn log_approval_decided(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
        approved: bool,
        approver: &str,
    ) -> Result<(), AuditError> {
        let event_type = if approved {
            AuditEventType::Approved
        } else {
            AuditEventType::Denied
        };
        let event = AuditEvent::builder(event_type, actor, tenant, action)
            .plan_id(plan_id)
            .approver(approver)
            .build();
        self.log(event).await
    }

    /// Log an authorization denial with its reason.
    pub async fn log_authorization_denied(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
        reason: &str,
    ) -> Result<(), AuditError> {
        let event =
            AuditEvent::builder(AuditEventType::AuthorizationDenied, actor, tenant, action)
                .plan_id(plan_id)
                .decision("deny")
                .reason(reason)
                .build();
        self.log(event).await
    }

    /// Log an execution hand-off.
    pub async fn log_execution_started(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
        execution_id: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::ExecutionStarted, actor, tenant, action)
            .plan_id(plan_id)
            .execution_id(execution_id)
            .decision("allow")
            .build();
        self.log(event).await
    }

    /// Log an idempotency conflict.
    pub async fn log_execution_conflict(
        &self,
        actor: &str,
        tenant: &str,
        action: &str,
        plan_id: &str,
    ) -> Result<(), AuditError> {
        let event = AuditEvent::builder(AuditEventType::ExecutionConflict, actor, tenant, action)
            .plan_id(plan_id)
            .reason("an execution is already active for this plan")
            .build();
        self.log(event).await
    }

    /// Query audit events with filters.
    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.storage.query(filter).await
    }

    /// Get an audit event by ID.
    pub async fn get(&self, event_id: uuid::Uuid) -> Result<Option<AuditEvent>, AuditError> {
        self.storage.get(event_id).await
    }

    /// Get recent events for a tenant.
    pub async fn recent_for_tenant(
        &self,
        tenant: &str,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        self.query(AuditFilter {
            tenant: Some(tenant.to_string()),
            limit: Some(limit),
            ..Default::default()
        })
        .await
    }
}

/// Filter for querying audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Filter by tenant.
    pub tenant: Option<String>,
    /// Filter by actor.
    pub actor: Option<String>,
    /// Filter by action name.
    pub action: Option<String>,
    /// Filter by plan ID.
    pub plan_id: Option<String>,
    /// Filter by event type.
    pub event_type: Option<AuditEventType>,
    /// Filter by start time.
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Filter by end time.
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
}

impl AuditFilter {
    /// Whether an event passes this filter (limit/offset excluded).
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(ref tenant) = self.tenant {
            if &event.tenant != tenant {
                return false;
            }
        }
        if let Some(ref actor) = self.actor {
            if &event.actor != actor {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &event.action != action {
                return false;
            }
        }
        if let Some(ref plan_id) = self.plan_id {
            if event.plan_id.as_ref() != Some(plan_id) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if event.occurred_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.occurred_at > end {
                return false;
            }
        }
        true
    }
}
