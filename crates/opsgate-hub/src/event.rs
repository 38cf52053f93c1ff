//! The event payload broadcast on the [`crate::EventHub`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lifecycle state-change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    /// Dotted event kind, e.g. `plan.created`, `approval.updated`,
    /// `execution.updated`.
    pub kind: String,

    /// Session the event is scoped to. Empty for global events.
    #[serde(default)]
    pub session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,

    /// Event-specific payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,

    pub occurred_at: DateTime<Utc>,
}

impl HubEvent {
    pub fn new(kind: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            session_id: session_id.into(),
            plan_id: None,
            execution_id: None,
            payload: serde_json::Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_plan(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
