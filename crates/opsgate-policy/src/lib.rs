//! Opsgate policy enforcement.
//!
//! Turns a classified risk level, a blast-scope context, and an external
//! policy checker's verdict into a single authoritative decision for an
//! action, applying deterministic escalation and break-glass rules on top
//! of whatever the checker said.
//!
//! The engine itself is stateless per call; the only shared state is the
//! policy configuration snapshot, swapped atomically via [`PolicyHandle`].

mod engine;
mod error;
mod risk;

pub use engine::{
    ActionRef, Decision, PolicyChecker, PolicyDecision, PolicyEngine, PolicyHandle, PolicyInput,
    RiskContext,
};
pub use error::PolicyError;
pub use risk::{blast_radius, tier, BlastRadius, KeywordRiskClassifier, RiskClassifier, Tier};
