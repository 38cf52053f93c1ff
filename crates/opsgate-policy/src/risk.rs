//! Risk tiers, blast radius, and the fallback intent classifier.

use opsgate_core::{ContextRef, RiskLevel};
use serde::{Deserialize, Serialize};

/// Coarse risk bucket used to decide whether break-glass applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Read,
    Safe,
    BreakGlass,
}

/// Map a risk level to its tier.
///
/// Anything above `medium` (including unknown levels, which parse to
/// `high`) requires break-glass.
pub fn tier(risk: RiskLevel) -> Tier {
    match risk {
        RiskLevel::Read => Tier::Read,
        RiskLevel::Low | RiskLevel::Medium => Tier::Safe,
        _ => Tier::BreakGlass,
    }
}

/// Qualitative scope of an action's potential impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlastRadius {
    Namespace,
    Cluster,
    Account,
}

impl std::fmt::Display for BlastRadius {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespace => write!(f, "namespace"),
            Self::Cluster => write!(f, "cluster"),
            Self::Account => write!(f, "account"),
        }
    }
}

/// Derive the blast radius from the target count and context.
pub fn blast_radius(context: &ContextRef, targets: i64) -> BlastRadius {
    if targets <= 0 {
        return BlastRadius::Namespace;
    }
    if targets <= 10 && !context.namespace.is_empty() {
        return BlastRadius::Namespace;
    }
    if targets <= 50 {
        return BlastRadius::Cluster;
    }
    BlastRadius::Account
}

/// Maps free-text operator intent to a risk level.
///
/// The production classifier is an external collaborator; this trait is the
/// seam, and [`KeywordRiskClassifier`] is the deterministic fallback used
/// when a stored plan carries no risk level.
pub trait RiskClassifier: Send + Sync {
    fn classify(&self, intent: &str) -> RiskLevel;
}

/// Keyword-based risk classifier.
///
/// Checks the most destructive vocabulary first so that a mixed intent
/// ("show me how to delete ...") lands in the conservative bucket.
#[derive(Debug, Clone, Default)]
pub struct KeywordRiskClassifier;

const HIGH_RISK_KEYWORDS: &[&str] = &[
    "delete", "destroy", "drop", "rotate", "secret", "credential", "failover", "terminate",
    "wipe",
];
const READ_KEYWORDS: &[&str] = &[
    "show", "list", "get ", "status", "describe", "view", "logs", "inspect",
];
const MEDIUM_RISK_KEYWORDS: &[&str] = &["deploy", "scale", "rollout", "upgrade", "migrate"];
const LOW_RISK_KEYWORDS: &[&str] = &["restart", "sync", "refresh", "resume", "pause"];

impl RiskClassifier for KeywordRiskClassifier {
    fn classify(&self, intent: &str) -> RiskLevel {
        let intent = intent.to_ascii_lowercase();
        if HIGH_RISK_KEYWORDS.iter().any(|k| intent.contains(k)) {
            return RiskLevel::High;
        }
        if READ_KEYWORDS.iter().any(|k| intent.contains(k)) {
            return RiskLevel::Read;
        }
        if MEDIUM_RISK_KEYWORDS.iter().any(|k| intent.contains(k)) {
            return RiskLevel::Medium;
        }
        if LOW_RISK_KEYWORDS.iter().any(|k| intent.contains(k)) {
            return RiskLevel::Low;
        }
        RiskLevel::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_mapping_is_exact() {
        assert_eq!(tier(RiskLevel::Read), Tier::Read);
        assert_eq!(tier(RiskLevel::Low), Tier::Safe);
        assert_eq!(tier(RiskLevel::Medium), Tier::Safe);
        assert_eq!(tier(RiskLevel::High), Tier::BreakGlass);
        // Unknown strings fold to high, which lands in break_glass.
        assert_eq!(tier(RiskLevel::parse_lenient("??")), Tier::BreakGlass);
    }

    fn ctx(namespace: &str) -> ContextRef {
        ContextRef {
            tenant: "acme".into(),
            environment: "prod".into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    #[test]
    fn zero_or_negative_targets_are_namespace_scoped() {
        assert_eq!(blast_radius(&ctx(""), 0), BlastRadius::Namespace);
        assert_eq!(blast_radius(&ctx(""), -3), BlastRadius::Namespace);
    }

    #[test]
    fn small_target_counts_need_a_namespace() {
        assert_eq!(blast_radius(&ctx("payments"), 10), BlastRadius::Namespace);
        // Without a namespace the same count widens to the cluster.
        assert_eq!(blast_radius(&ctx(""), 10), BlastRadius::Cluster);
    }

    #[test]
    fn mid_counts_are_cluster_scoped() {
        assert_eq!(blast_radius(&ctx(""), 11), BlastRadius::Cluster);
        assert_eq!(blast_radius(&ctx("payments"), 50), BlastRadius::Cluster);
    }

    #[test]
    fn large_counts_are_always_account_scoped() {
        assert_eq!(blast_radius(&ctx("payments"), 51), BlastRadius::Account);
        assert_eq!(blast_radius(&ctx(""), 500), BlastRadius::Account);
    }

    #[test]
    fn classifier_prefers_destructive_vocabulary() {
        let classifier = KeywordRiskClassifier;
        assert_eq!(classifier.classify("rotate the db secrets"), RiskLevel::High);
        assert_eq!(
            classifier.classify("show me how to delete the cluster"),
            RiskLevel::High
        );
        assert_eq!(classifier.classify("list pods in payments"), RiskLevel::Read);
        assert_eq!(classifier.classify("deploy v2 to staging"), RiskLevel::Medium);
        assert_eq!(classifier.classify("restart the api pods"), RiskLevel::Low);
        assert_eq!(classifier.classify("do the thing"), RiskLevel::Medium);
    }
}
