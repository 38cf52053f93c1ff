//! Policy engine error types.

/// Errors from policy evaluation.
///
/// A missing checker is a configuration error, not a denial: the request
/// fails and is never retried. A checker failure is a collaborator outage
/// and only read actions survive it. `NotAuthorized` is the terminal
/// denial surfaced by [`crate::PolicyEngine::policy_check`].
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("no policy checker configured")]
    NoChecker,

    #[error("policy checker failed: {0}")]
    Checker(#[source] anyhow::Error),

    #[error("action not authorized: decision was '{decision}'")]
    NotAuthorized { decision: String },
}

impl PolicyError {
    /// Whether this error is a configuration problem rather than a verdict.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::NoChecker)
    }
}
