//! Event gate error types.

/// Errors from the event gate.
///
/// A store failure means the event was NOT accepted (the gate fails
/// closed) and is distinct from suppression by dedup, so callers can tell
/// an outage from normal rate limiting.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("event gate store error: {0}")]
    Store(#[source] anyhow::Error),
}
