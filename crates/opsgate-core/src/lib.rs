use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Configuration types shared across all Opsgate crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{
    ApprovalConfig,
    AuditConfig,
    EventGateConfig,
    HubConfig,
    // Main config
    OpsgateConfig,
    PolicyConfig,
};

/// Step stage executed against the target systems.
pub const STAGE_ACT: &str = "act";
/// Step stage that checks the outcome of prior act steps.
pub const STAGE_VERIFY: &str = "verify";

/// Coarse risk bucket assigned to an intent.
///
/// Unknown strings fold to [`RiskLevel::High`] so that anything the
/// classifier cannot place lands in the most restrictive tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Pure visibility, no mutation.
    Read,
    /// Routine, reversible mutation.
    Low,
    /// Mutation with meaningful blast radius.
    Medium,
    /// Destructive or hard-to-reverse mutation.
    High,
}

impl RiskLevel {
    /// Parse a risk level string, folding unknown values to `High`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Self::Read,
            "low" => Self::Low,
            "medium" => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an action only reads state or mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Read,
    Write,
}

impl ActionKind {
    /// Derive the action kind from a risk level: only `read` risk is a read.
    pub fn from_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Read => Self::Read,
            _ => Self::Write,
        }
    }
}

/// Immutable reference identifying the blast scope of an action.
///
/// Only `tenant` and `environment` are required when a plan is created;
/// execution-time validation requires every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub org: String,
}

impl ContextRef {
    /// Validate the fields required at plan-creation time.
    pub fn validate_minimal(&self) -> Result<(), ValidationError> {
        for (name, value) in [("tenant", &self.tenant), ("environment", &self.environment)] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingContextField(name));
            }
        }
        Ok(())
    }

    /// Validate every field, as required at execution time.
    pub fn validate_strict(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("tenant", &self.tenant),
            ("environment", &self.environment),
            ("cluster", &self.cluster),
            ("namespace", &self.namespace),
            ("account", &self.account),
            ("region", &self.region),
            ("project", &self.project),
            ("org", &self.org),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingContextField(name));
            }
        }
        Ok(())
    }

    /// Whether the context targets a production environment.
    pub fn is_prod(&self) -> bool {
        self.environment.eq_ignore_ascii_case("prod")
    }
}

/// One unit of work inside a plan.
///
/// Steps are ordered; `verify` steps run after `act` steps. A blank stage
/// means `act`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub stage: String,
    pub action: String,
    pub tool: String,
    #[serde(default)]
    pub input: serde_json::Value,
    /// Compensating step applied when this step must be undone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Box<PlanStep>>,
}

impl PlanStep {
    pub fn new(action: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            stage: String::new(),
            action: action.into(),
            tool: tool.into(),
            input: serde_json::Value::Null,
            rollback: None,
        }
    }

    /// The stage this step runs in, with the blank default applied.
    pub fn effective_stage(&self) -> &str {
        if self.stage.is_empty() {
            STAGE_ACT
        } else {
            &self.stage
        }
    }

    /// Copy of the step with a blank stage normalized to `act`.
    pub fn normalized(&self) -> PlanStep {
        let mut step = self.clone();
        if step.stage.is_empty() {
            step.stage = STAGE_ACT.to_string();
        }
        step
    }
}

/// Runtime constraints evaluated against a plan's steps and context at
/// execution time, independently of the policy decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConstraints {
    /// Maximum number of steps/targets an execution may touch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_targets: Option<usize>,

    /// Environments the plan may execute against. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_environments: Vec<String>,
}

impl RuntimeConstraints {
    /// Check the constraints against concrete steps and context.
    ///
    /// Returns the first violation as a human-readable reason.
    pub fn check(&self, steps: &[PlanStep], context: &ContextRef) -> Result<(), String> {
        if let Some(max) = self.max_targets {
            if steps.len() > max {
                return Err(format!(
                    "plan touches {} targets, constraint allows at most {}",
                    steps.len(),
                    max
                ));
            }
        }
        if !self.allowed_environments.is_empty()
            && !self
                .allowed_environments
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&context.environment))
        {
            return Err(format!(
                "environment '{}' is not in the allowed environments",
                context.environment
            ));
        }
        Ok(())
    }

    /// Merge another constraint set, keeping the stricter value per field.
    pub fn merge(&self, other: &RuntimeConstraints) -> RuntimeConstraints {
        let max_targets = match (self.max_targets, other.max_targets) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let allowed_environments = if self.allowed_environments.is_empty() {
            other.allowed_environments.clone()
        } else {
            self.allowed_environments.clone()
        };
        RuntimeConstraints {
            max_targets,
            allowed_environments,
        }
    }
}

/// An executable action plan derived from an operator intent.
///
/// Immutable after creation; approval and execution state live in their own
/// records keyed by `plan_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,

    /// Session that created the plan. Execution is pinned to this session
    /// when non-empty.
    #[serde(default)]
    pub session_id: String,

    /// What caused the plan to exist (e.g. "operator", "webhook:alertmanager").
    #[serde(default)]
    pub trigger: String,

    #[serde(default)]
    pub summary: String,

    /// The original natural-language intent.
    pub intent: String,

    /// Risk level fixed at creation. Re-derived from the intent when absent
    /// at execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,

    pub context: ContextRef,

    #[serde(default)]
    pub constraints: RuntimeConstraints,

    pub steps: Vec<PlanStep>,

    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Create a plan with a fresh ID and the current timestamp.
    pub fn new(intent: impl Into<String>, context: ContextRef, steps: Vec<PlanStep>) -> Self {
        Self {
            plan_id: Uuid::new_v4().to_string(),
            session_id: String::new(),
            trigger: String::new(),
            summary: String::new(),
            intent: intent.into(),
            risk_level: None,
            context,
            constraints: RuntimeConstraints::default(),
            steps,
            created_at: Utc::now(),
        }
    }
}

/// Validation failures for domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required context field '{0}'")]
    MissingContextField(&'static str),

    #[error("unrecognized approval status '{0}'")]
    UnknownApprovalStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_context() -> ContextRef {
        ContextRef {
            tenant: "acme".into(),
            environment: "prod".into(),
            cluster: "east-1".into(),
            namespace: "payments".into(),
            account: "123456".into(),
            region: "us-east-1".into(),
            project: "payments".into(),
            org: "1".into(),
        }
    }

    #[test]
    fn risk_level_parse_folds_unknown_to_high() {
        assert_eq!(RiskLevel::parse_lenient("read"), RiskLevel::Read);
        assert_eq!(RiskLevel::parse_lenient("LOW"), RiskLevel::Low);
        assert_eq!(RiskLevel::parse_lenient("medium"), RiskLevel::Medium);
        assert_eq!(RiskLevel::parse_lenient("high"), RiskLevel::High);
        assert_eq!(RiskLevel::parse_lenient("critical"), RiskLevel::High);
        assert_eq!(RiskLevel::parse_lenient(""), RiskLevel::High);
    }

    #[test]
    fn action_kind_from_risk() {
        assert_eq!(ActionKind::from_risk(RiskLevel::Read), ActionKind::Read);
        assert_eq!(ActionKind::from_risk(RiskLevel::Low), ActionKind::Write);
        assert_eq!(ActionKind::from_risk(RiskLevel::High), ActionKind::Write);
    }

    #[test]
    fn minimal_validation_requires_tenant_and_environment() {
        let mut ctx = ContextRef {
            tenant: "acme".into(),
            environment: "staging".into(),
            ..Default::default()
        };
        ctx.validate_minimal().unwrap();

        ctx.environment.clear();
        assert_eq!(
            ctx.validate_minimal(),
            Err(ValidationError::MissingContextField("environment"))
        );
    }

    #[test]
    fn strict_validation_requires_all_fields() {
        let mut ctx = full_context();
        ctx.validate_strict().unwrap();

        ctx.region.clear();
        assert_eq!(
            ctx.validate_strict(),
            Err(ValidationError::MissingContextField("region"))
        );
    }

    #[test]
    fn blank_stage_defaults_to_act() {
        let step = PlanStep::new("rollout-restart", "kubectl");
        assert_eq!(step.effective_stage(), STAGE_ACT);
        assert_eq!(step.normalized().stage, STAGE_ACT);

        let mut verify = PlanStep::new("check-rollout", "kubectl");
        verify.stage = STAGE_VERIFY.to_string();
        assert_eq!(verify.effective_stage(), STAGE_VERIFY);
    }

    #[test]
    fn constraints_max_targets() {
        let constraints = RuntimeConstraints {
            max_targets: Some(1),
            ..Default::default()
        };
        let steps = vec![
            PlanStep::new("a", "kubectl"),
            PlanStep::new("b", "kubectl"),
        ];
        let err = constraints.check(&steps, &full_context()).unwrap_err();
        assert!(err.contains("at most 1"));
    }

    #[test]
    fn constraints_allowed_environments_case_insensitive() {
        let constraints = RuntimeConstraints {
            allowed_environments: vec!["Staging".into()],
            ..Default::default()
        };
        let mut ctx = full_context();
        ctx.environment = "staging".into();
        constraints.check(&[], &ctx).unwrap();

        ctx.environment = "prod".into();
        assert!(constraints.check(&[], &ctx).is_err());
    }

    #[test]
    fn constraints_merge_keeps_stricter_max() {
        let a = RuntimeConstraints {
            max_targets: Some(10),
            ..Default::default()
        };
        let b = RuntimeConstraints {
            max_targets: Some(3),
            allowed_environments: vec!["staging".into()],
        };
        let merged = a.merge(&b);
        assert_eq!(merged.max_targets, Some(3));
        assert_eq!(merged.allowed_environments, vec!["staging".to_string()]);
    }
}
