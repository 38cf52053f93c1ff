//! Plan content hashing for approval pinning.

use opsgate_core::PlanStep;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct HashEnvelope<'a> {
    intent: &'a str,
    steps: &'a [PlanStep],
}

/// Compute the tamper-detection hash over a plan's intent and steps.
///
/// Blank stages are normalized to `act` first so that a step written
/// without a stage and the same step written explicitly hash identically.
/// The envelope is serialized with `serde_json` (object keys are sorted,
/// so the encoding is canonical), digested with SHA-256, and hex-encoded
/// to a stable 64-character string suitable for direct equality
/// comparison.
pub fn compute_plan_hash(intent: &str, steps: &[PlanStep]) -> Result<String, serde_json::Error> {
    let normalized: Vec<PlanStep> = steps.iter().map(PlanStep::normalized).collect();
    let envelope = HashEnvelope {
        intent,
        steps: &normalized,
    };
    let bytes = serde_json::to_vec(&envelope)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(action: &str, input: serde_json::Value) -> PlanStep {
        let mut step = PlanStep::new(action, "kubectl");
        step.input = input;
        step
    }

    #[test]
    fn hash_is_deterministic() {
        let steps = vec![step("scale", json!({"replicas": 3}))];
        let a = compute_plan_hash("scale up", &steps).unwrap();
        let b = compute_plan_hash("scale up", &steps).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn blank_and_explicit_act_stages_hash_identically() {
        let blank = vec![step("scale", json!({}))];
        let mut explicit = blank.clone();
        explicit[0].stage = "act".to_string();

        assert_eq!(
            compute_plan_hash("scale up", &blank).unwrap(),
            compute_plan_hash("scale up", &explicit).unwrap()
        );
    }

    #[test]
    fn any_content_change_changes_the_hash() {
        let steps = vec![step("scale", json!({"replicas": 3}))];
        let base = compute_plan_hash("scale up", &steps).unwrap();

        let mut other_tool = steps.clone();
        other_tool[0].tool = "helm".to_string();
        assert_ne!(base, compute_plan_hash("scale up", &other_tool).unwrap());

        let mut other_action = steps.clone();
        other_action[0].action = "restart".to_string();
        assert_ne!(base, compute_plan_hash("scale up", &other_action).unwrap());

        let mut other_input = steps.clone();
        other_input[0].input = json!({"replicas": 4});
        assert_ne!(base, compute_plan_hash("scale up", &other_input).unwrap());

        assert_ne!(base, compute_plan_hash("scale down", &steps).unwrap());
    }

    #[test]
    fn step_order_is_significant() {
        let a = vec![step("scale", json!({})), step("verify", json!({}))];
        let b = vec![step("verify", json!({})), step("scale", json!({}))];
        assert_ne!(
            compute_plan_hash("x", &a).unwrap(),
            compute_plan_hash("x", &b).unwrap()
        );
    }
}
