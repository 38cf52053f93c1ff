//! Webhook event dedup gate.
//!
//! Webhook sources (alerting, GitOps, git, k8s) fire repeatedly for the
//! same underlying condition. The gate keeps each firing from becoming a
//! new plan: it filters on alert severity, computes a content-addressed
//! fingerprint for the event, and asks a backing store whether this
//! `(source, fingerprint)` pair should open the gate given the configured
//! dedup window, backoff, and repeat threshold.
//!
//! The gate itself is stateless; with no gate or no store configured it
//! always allows (the feature is opt-in). Store errors fail closed and
//! are surfaced distinctly from dedup suppression.

mod error;
mod gate;
mod store;

pub use error::GateError;
pub use gate::{fingerprint, EventGate, GateDecision};
pub use store::{EventGateStore, GateState, MemoryGateStore};
