//! Approval records and status normalization.

use chrono::{DateTime, Utc};
use opsgate_core::ValidationError;
use serde::{Deserialize, Serialize};

/// Status of a plan approval. One active status per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a decision.
    Pending,
    /// Approved (manually or automatically).
    Approved,
    /// Denied by a human.
    Denied,
    /// Expired before a decision.
    Expired,
}

impl ApprovalStatus {
    /// Normalize a status string: the empty string folds to `pending`,
    /// anything unrecognized is rejected.
    pub fn normalize(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "expired" => Ok(Self::Expired),
            other => Err(ValidationError::UnknownApprovalStatus(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An approval record for a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub plan_id: String,

    pub status: ApprovalStatus,

    /// SHA-256 digest over the plan's `{intent, steps}` computed at the
    /// moment of approval. The tamper-detection anchor: execution
    /// recomputes the hash and refuses on mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Approval {
    /// Create a pending approval for a plan.
    pub fn pending(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            status: ApprovalStatus::Pending,
            approval_hash: None,
            decided_by: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    /// Create an approval that is immediately approved, carrying the
    /// pinned hash.
    pub fn approved(plan_id: impl Into<String>, hash: String, decided_by: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            status: ApprovalStatus::Approved,
            approval_hash: Some(hash),
            decided_by: Some(decided_by.into()),
            decided_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_status_folds_to_pending() {
        assert_eq!(ApprovalStatus::normalize("").unwrap(), ApprovalStatus::Pending);
        assert_eq!(
            ApprovalStatus::normalize("pending").unwrap(),
            ApprovalStatus::Pending
        );
        assert_eq!(
            ApprovalStatus::normalize("Approved").unwrap(),
            ApprovalStatus::Approved
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = ApprovalStatus::normalize("cancelled").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownApprovalStatus("cancelled".to_string())
        );
    }

    #[test]
    fn approved_constructor_carries_the_hash() {
        let approval = Approval::approved("plan-1", "abc".to_string(), "auto");
        assert!(approval.is_approved());
        assert_eq!(approval.approval_hash.as_deref(), Some("abc"));
        assert_eq!(approval.decided_by.as_deref(), Some("auto"));
    }
}
