//! Persistence seams for the lifecycle.
//!
//! The orchestrator depends on a required [`PlanStore`] plus a set of
//! optional capabilities detected at runtime. A concrete store implements
//! whichever subset it supports; absence of an optional capability
//! degrades the corresponding check (no hash storage means no tamper
//! check, no execution probe means no idempotency pre-check) instead of
//! failing.

use crate::approval::Approval;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsgate_core::{Plan, PlanStep};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A running (or finished) execution of a plan.
///
/// Created only after every authorization check passed. At most one
/// execution may be active per plan at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub plan_id: String,

    /// Workflow identifier returned by the executor, when it returns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    pub started_at: DateTime<Utc>,
}

impl Execution {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            plan_id: plan_id.into(),
            workflow_id: None,
            started_at: Utc::now(),
        }
    }
}

/// Required persistence surface for the lifecycle.
///
/// All methods are keyed by opaque string IDs and are context-cancellable
/// by dropping the future.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn create_plan(&self, plan: &Plan) -> Result<(), StoreError>;
    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError>;
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;

    async fn create_approval(&self, approval: &Approval) -> Result<(), StoreError>;
    async fn get_approval(&self, plan_id: &str) -> Result<Option<Approval>, StoreError>;
    async fn update_approval(&self, approval: &Approval) -> Result<(), StoreError>;

    async fn create_execution(&self, execution: &Execution) -> Result<(), StoreError>;
    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>, StoreError>;

    // ===== Optional capabilities, detected at runtime =====

    /// Separate hash persistence, when supported.
    fn hash_store(&self) -> Option<&dyn ApprovalHashStore> {
        None
    }

    /// Active-execution lookups, when supported.
    fn execution_probe(&self) -> Option<&dyn ActiveExecutionProbe> {
        None
    }

    /// Workflow-ID updates, when supported.
    fn workflow_binder(&self) -> Option<&dyn WorkflowBinder> {
        None
    }

    /// Step listing for plans stored without inline steps, when supported.
    fn step_lister(&self) -> Option<&dyn StepLister> {
        None
    }

    /// Single-use approval tokens, when supported.
    fn token_store(&self) -> Option<&dyn ApprovalTokenStore> {
        None
    }
}

/// Optional capability: persist and read approval hashes out of band.
#[async_trait]
pub trait ApprovalHashStore: Send + Sync {
    async fn put_hash(&self, plan_id: &str, hash: &str) -> Result<(), StoreError>;
    async fn get_hash(&self, plan_id: &str) -> Result<Option<String>, StoreError>;
}

/// Optional capability: answer whether a plan already has an active
/// execution.
#[async_trait]
pub trait ActiveExecutionProbe: Send + Sync {
    async fn has_active_execution(&self, plan_id: &str) -> Result<bool, StoreError>;
}

/// Optional capability: bind the executor's workflow ID to an execution.
#[async_trait]
pub trait WorkflowBinder: Send + Sync {
    async fn bind_workflow(&self, execution_id: &str, workflow_id: &str) -> Result<(), StoreError>;
}

/// Optional capability: list a plan's steps when the plan body carries
/// none.
#[async_trait]
pub trait StepLister: Send + Sync {
    async fn list_steps(&self, plan_id: &str) -> Result<Vec<PlanStep>, StoreError>;
}

/// Optional capability: resolve and consume a single-use approval token.
#[async_trait]
pub trait ApprovalTokenStore: Send + Sync {
    /// Consume the token and return the approval it resolves to, if any.
    /// A token never resolves twice.
    async fn consume_token(&self, token: &str) -> Result<Option<Approval>, StoreError>;
}
