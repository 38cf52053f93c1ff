//! # opsgate-audit
//!
//! Audit logging for Opsgate. Every allow/deny decision on a mutating
//! action is recorded as a structured event carrying the actor, the
//! action, the decision, and a free-text reason, so an operator can
//! reconstruct why a plan was or was not allowed to run.
//!
//! The format follows: [actor - tenant - action - decision] with plan and
//! execution correlation fields.

mod error;
mod event;
mod logger;
mod storage;

pub use error::AuditError;
pub use event::{AuditEvent, AuditEventBuilder, AuditEventType};
pub use logger::{AuditFilter, AuditLogger};
pub use storage::{AuditStorage, ConsoleStorage, FileStorage, NullStorage};
