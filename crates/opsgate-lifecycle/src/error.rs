//! Lifecycle error taxonomy.
//!
//! Four distinct failure families, because callers treat them differently:
//! configuration errors are fatal and never retried; authorization denials
//! are terminal and audited; idempotency conflicts are retriable by the
//! caller; collaborator errors fail closed on every write and integrity
//! path.

use opsgate_core::ValidationError;
use opsgate_policy::PolicyError;

/// Errors from persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    /// A write raced with a conflicting record (e.g. an execution is
    /// already active for the plan).
    #[error("conflicting write: {0}")]
    Conflict(String),
}

/// Errors from the plan lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The system is misconfigured for this request (e.g. no policy
    /// checker on a write path). Fatal, not retried.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("no approval exists for plan: {0}")]
    ApprovalNotFound(String),

    /// Terminal authorization denial, already audited with its reason.
    #[error("authorization denied: {reason}")]
    Denied { reason: String },

    /// The plan's content no longer matches the hash pinned at approval.
    #[error("plan modified after approval")]
    PlanModified,

    /// An execution is already active for this plan. Retriable by the
    /// caller once the active execution finishes.
    #[error("an execution is already active for plan {plan_id}")]
    Conflict { plan_id: String },

    /// A best-effort side channel failed (e.g. the external approval
    /// issue could not be opened). State already persisted is kept.
    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("policy evaluation failed: {0}")]
    Policy(#[source] PolicyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("executor error: {0}")]
    Executor(#[source] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LifecycleError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry this request later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Translate a policy failure into the lifecycle taxonomy: a missing
/// checker is a configuration error, everything else stays a collaborator
/// failure.
pub(crate) fn map_policy_error(err: PolicyError) -> LifecycleError {
    if err.is_config() {
        LifecycleError::Config(err.to_string())
    } else {
        LifecycleError::Policy(err)
    }
}
