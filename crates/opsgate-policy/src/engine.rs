//! The policy decision engine.
//!
//! Combines the external checker's verdict with deterministic escalation
//! and break-glass rules. The override rules apply only to write actions
//! and in a fixed order; each may overwrite the previous result, and the
//! break-glass rule is final.

use crate::error::PolicyError;
use crate::risk::{blast_radius, tier, BlastRadius, Tier};
use async_trait::async_trait;
use opsgate_core::{ActionKind, ContextRef, PolicyConfig, RiskLevel};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// The verdict of a policy evaluation.
///
/// An empty decision string from the checker parses to `Allow`; anything
/// unrecognized is carried verbatim so callers can log it, and is treated
/// as a denial wherever a boolean answer is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Decision {
    Allow,
    RequireApproval,
    Deny,
    Other(String),
}

impl From<String> for Decision {
    fn from(s: String) -> Self {
        match s.trim() {
            "" | "allow" => Self::Allow,
            "require_approval" => Self::RequireApproval,
            "deny" => Self::Deny,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<Decision> for String {
    fn from(d: Decision) -> Self {
        d.to_string()
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::RequireApproval => write!(f, "require_approval"),
            Self::Deny => write!(f, "deny"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Result of a policy check. Transient; recomputed on every authorization
/// check and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: Decision,

    /// Opaque constraints the checker attached to the decision.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub constraints: serde_json::Value,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            constraints: serde_json::Value::Null,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// The action under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
    pub kind: ActionKind,
}

/// Risk inputs for an evaluation: the classified level and how many
/// targets the action touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskContext {
    pub level: RiskLevel,
    pub target_count: i64,
}

/// Full input to a policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyInput {
    pub actor: String,
    pub action: ActionRef,
    pub context: ContextRef,
    pub risk: RiskContext,

    /// Request-level break-glass override signal.
    #[serde(default)]
    pub break_glass: bool,
}

/// External policy checker. Stateless; may be called concurrently.
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    async fn evaluate(&self, input: &PolicyInput) -> anyhow::Result<PolicyDecision>;
}

/// Atomically swapped policy configuration snapshot.
///
/// Readers clone the inner `Arc` and never observe a partially updated
/// configuration; writers replace the whole snapshot.
#[derive(Debug)]
pub struct PolicyHandle {
    inner: RwLock<Arc<PolicyConfig>>,
}

impl PolicyHandle {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<PolicyConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the snapshot.
    pub fn swap(&self, config: PolicyConfig) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(config);
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

/// The policy decision engine.
pub struct PolicyEngine {
    checker: Option<Arc<dyn PolicyChecker>>,
    config: Arc<PolicyHandle>,
}

impl PolicyEngine {
    /// Create an engine with no checker. Reads may still fail open
    /// depending on configuration; writes always fail.
    pub fn new(config: Arc<PolicyHandle>) -> Self {
        Self {
            checker: None,
            config,
        }
    }

    /// Attach the external policy checker.
    pub fn with_checker(mut self, checker: Arc<dyn PolicyChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn config(&self) -> &PolicyHandle {
        &self.config
    }

    /// Render a decision for the given input.
    ///
    /// Check order is significant:
    /// 1. no checker configured: reads succeed with `allow` only when
    ///    `fail_open_reads` is set; writes are a configuration error;
    /// 2. checker errors degrade reads to `allow` and propagate for writes;
    /// 3. write-only overrides, each able to overwrite the previous result:
    ///    prod escalation, risk escalation, account blast-radius force,
    ///    and finally break-glass denial.
    pub async fn decide(&self, input: &PolicyInput) -> Result<PolicyDecision, PolicyError> {
        let config = self.config.current();

        let mut decision = match &self.checker {
            None => {
                if input.action.kind == ActionKind::Read && config.fail_open_reads {
                    tracing::debug!(
                        actor = %input.actor,
                        action = %input.action.name,
                        "no policy checker configured; allowing read"
                    );
                    PolicyDecision::allow()
                } else {
                    return Err(PolicyError::NoChecker);
                }
            }
            Some(checker) => match checker.evaluate(input).await {
                Ok(decision) => decision,
                Err(err) if input.action.kind == ActionKind::Read => {
                    tracing::warn!(
                        actor = %input.actor,
                        action = %input.action.name,
                        error = %err,
                        "policy checker failed; allowing read"
                    );
                    PolicyDecision::allow()
                }
                Err(err) => return Err(PolicyError::Checker(err)),
            },
        };

        if input.action.kind == ActionKind::Write {
            let action_tier = tier(input.risk.level);
            let radius = blast_radius(&input.context, input.risk.target_count);

            if decision.decision == Decision::Allow && input.context.is_prod() {
                decision.decision = Decision::RequireApproval;
            }
            if decision.decision == Decision::Allow
                && !matches!(input.risk.level, RiskLevel::Read | RiskLevel::Low)
            {
                decision.decision = Decision::RequireApproval;
            }
            if radius == BlastRadius::Account {
                decision.decision = Decision::RequireApproval;
            }
            // Final rule: unauthorized break-glass tier denies no matter
            // what the earlier rules produced.
            if action_tier == Tier::BreakGlass && !input.break_glass {
                decision.decision = Decision::Deny;
            }

            tracing::debug!(
                actor = %input.actor,
                action = %input.action.name,
                environment = %input.context.environment,
                risk = %input.risk.level,
                targets = input.risk.target_count,
                radius = %radius,
                decision = %decision.decision,
                "policy decision"
            );
        }

        Ok(decision)
    }

    /// Boolean-style wrapper: any decision other than `allow` is an
    /// authorization failure.
    pub async fn policy_check(&self, input: &PolicyInput) -> Result<(), PolicyError> {
        let decision = self.decide(input).await?;
        match decision.decision {
            Decision::Allow => Ok(()),
            other => Err(PolicyError::NotAuthorized {
                decision: other.to_string(),
            }),
        }
    }
}
