//! Approval workflow configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the plan approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Automatically approve low-risk write plans the policy engine allowed.
    #[serde(default)]
    pub auto_approve_low_risk: bool,

    /// Open an external issue (e.g. a ticket) for each pending approval.
    #[serde(default)]
    pub external_issues: bool,

    /// Hours until a pending approval expires.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_low_risk: false,
            external_issues: false,
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> u32 {
    24
}
