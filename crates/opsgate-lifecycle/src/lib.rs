//! # opsgate-lifecycle
//!
//! The plan → approval → execution state machine. This crate owns the
//! lifecycle of a [`opsgate_core::Plan`] from creation through approval to
//! execution:
//!
//! - **Creation**: context validation, risk classification, a policy
//!   decision, persistence, and either auto-approval (low risk) or a
//!   pending approval with an optional external issue.
//! - **Approval**: manual status updates; approving pins the plan content
//!   with a SHA-256 hash so later tampering is detectable.
//! - **Execution**: re-validates the session, the context (strictly this
//!   time), the policy decision, runtime constraints, the approval status,
//!   and the pinned hash, then guards idempotency before handing off to
//!   the external executor.
//!
//! Persistence, approval issuance, and execution start are capability
//! interfaces; a store implements whichever subset it supports and the
//! orchestrator degrades gracefully when an optional capability is absent.

mod approval;
mod error;
mod hash;
mod memory;
mod orchestrator;
mod store;

pub use approval::{Approval, ApprovalStatus};
pub use error::{LifecycleError, StoreError};
pub use hash::compute_plan_hash;
pub use memory::MemoryStore;
pub use orchestrator::{
    ApprovalIssuer, CreatePlanOutcome, CreatePlanRequest, ExecutePlanRequest, Executor,
    PlanOrchestrator,
};
pub use store::{
    ActiveExecutionProbe, ApprovalHashStore, ApprovalTokenStore, Execution, PlanStore, StepLister,
    WorkflowBinder,
};
