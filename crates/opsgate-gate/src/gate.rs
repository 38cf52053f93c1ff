//! The event gate itself: severity filter, fingerprint, store delegation.

use crate::error::GateError;
use crate::store::EventGateStore;
use chrono::Utc;
use opsgate_core::EventGateConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// The outcome of [`EventGate::accept`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether the event may become a plan.
    pub allowed: bool,
    /// Content-addressed identity of the event. Empty when the gate
    /// decided before fingerprinting (fail-open or severity reject).
    pub fingerprint: String,
}

impl GateDecision {
    fn open() -> Self {
        Self {
            allowed: true,
            fingerprint: String::new(),
        }
    }

    fn rejected() -> Self {
        Self {
            allowed: false,
            fingerprint: String::new(),
        }
    }
}

/// Content-addressed identity for a webhook event, independent of arrival
/// time: `sha256(source ":" canonical_json(payload))`, hex-encoded.
///
/// `serde_json` keeps object keys sorted, so serializing the payload value
/// is already canonical.
pub fn fingerprint(source: &str, payload: &serde_json::Value) -> String {
    let canonical = payload.to_string();
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// The webhook event dedup gate.
pub struct EventGate {
    config: EventGateConfig,
    store: Option<Arc<dyn EventGateStore>>,
}

impl EventGate {
    pub fn new(config: EventGateConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Attach the backing dedup store.
    pub fn with_store(mut self, store: Arc<dyn EventGateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Accept on an optional gate: a missing gate always allows.
    pub async fn accept_optional(
        gate: Option<&EventGate>,
        source: &str,
        payload: &serde_json::Value,
    ) -> Result<GateDecision, GateError> {
        match gate {
            Some(gate) => gate.accept(source, payload).await,
            None => Ok(GateDecision::open()),
        }
    }

    /// Decide whether a webhook event may become a plan.
    ///
    /// With no backing store the gate fails open. Severity filtering runs
    /// before fingerprinting; the store decision is final, and store
    /// errors fail closed.
    pub async fn accept(
        &self,
        source: &str,
        payload: &serde_json::Value,
    ) -> Result<GateDecision, GateError> {
        let Some(store) = &self.store else {
            return Ok(GateDecision::open());
        };
        if !self.config.enabled {
            return Ok(GateDecision::open());
        }

        if !self.config.severities.is_empty() {
            match extract_severity(payload) {
                None => {
                    tracing::debug!(source, "webhook event has no severity; rejected");
                    return Ok(GateDecision::rejected());
                }
                Some(severity) => {
                    let allowed = self
                        .config
                        .severities
                        .iter()
                        .any(|s| s.eq_ignore_ascii_case(&severity));
                    if !allowed {
                        tracing::debug!(source, %severity, "severity not in allow-list; rejected");
                        return Ok(GateDecision::rejected());
                    }
                }
            }
        }

        let fingerprint = fingerprint(source, payload);
        let state = store
            .upsert(
                source,
                &fingerprint,
                Utc::now(),
                self.config.effective_window(),
                self.config.backoff(),
                self.config.min_count,
            )
            .await
            .map_err(GateError::Store)?;

        if !state.allowed {
            tracing::debug!(
                source,
                fingerprint = %fingerprint,
                count = state.count,
                "webhook event suppressed by dedup"
            );
        }

        Ok(GateDecision {
            allowed: state.allowed,
            fingerprint,
        })
    }
}

/// Pull the alert severity out of a webhook payload: the first alert's
/// labels, falling back to `commonLabels.severity`.
fn extract_severity(payload: &serde_json::Value) -> Option<String> {
    if let Some(severity) = payload
        .get("alerts")
        .and_then(|alerts| alerts.get(0))
        .and_then(|alert| alert.get("labels"))
        .and_then(|labels| labels.get("severity"))
        .and_then(|s| s.as_str())
    {
        return Some(severity.to_string());
    }
    payload
        .get("commonLabels")
        .and_then(|labels| labels.get("severity"))
        .and_then(|s| s.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGateStore;
    use serde_json::json;

    fn gated(config: EventGateConfig) -> EventGate {
        EventGate::new(config).with_store(Arc::new(MemoryGateStore::new()))
    }

    fn enabled_config() -> EventGateConfig {
        EventGateConfig {
            enabled: true,
            ..Default::default()
        }
    }

    fn alert_payload(severity: &str) -> serde_json::Value {
        json!({
            "alerts": [{"labels": {"severity": severity, "alertname": "HighErrorRate"}}],
            "status": "firing"
        })
    }

    #[tokio::test]
    async fn nil_gate_always_allows() {
        let decision = EventGate::accept_optional(None, "alertmanager", &json!({}))
            .await
            .unwrap();
        assert!(decision.allowed);
        assert!(decision.fingerprint.is_empty());
    }

    #[tokio::test]
    async fn nil_store_always_allows() {
        let gate = EventGate::new(enabled_config());
        let decision = gate.accept("alertmanager", &json!({})).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.fingerprint.is_empty());
    }

    #[tokio::test]
    async fn missing_severity_is_rejected() {
        let gate = gated(EventGateConfig {
            severities: vec!["critical".into()],
            ..enabled_config()
        });
        let decision = gate.accept("alertmanager", &json!({"alerts": []})).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.fingerprint.is_empty());
    }

    #[tokio::test]
    async fn severity_allow_list_is_case_insensitive() {
        let gate = gated(EventGateConfig {
            severities: vec!["Critical".into()],
            ..enabled_config()
        });

        let decision = gate
            .accept("alertmanager", &alert_payload("CRITICAL"))
            .await
            .unwrap();
        assert!(decision.allowed);

        let decision = gate
            .accept("alertmanager", &alert_payload("warning"))
            .await
            .unwrap();
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn severity_falls_back_to_common_labels() {
        let gate = gated(EventGateConfig {
            severities: vec!["critical".into()],
            ..enabled_config()
        });
        let payload = json!({"commonLabels": {"severity": "critical"}});
        let decision = gate.accept("alertmanager", &payload).await.unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn fingerprint_is_stable_and_source_scoped() {
        let payload = alert_payload("critical");
        let a = fingerprint("alertmanager", &payload);
        let b = fingerprint("alertmanager", &payload);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other_source = fingerprint("argocd", &payload);
        assert_ne!(a, other_source);

        let other_payload = fingerprint("alertmanager", &alert_payload("warning"));
        assert_ne!(a, other_payload);
    }

    #[tokio::test]
    async fn duplicate_events_are_suppressed_inside_the_backoff() {
        let gate = gated(enabled_config());
        let payload = alert_payload("critical");

        let first = gate.accept("alertmanager", &payload).await.unwrap();
        assert!(first.allowed);

        let second = gate.accept("alertmanager", &payload).await.unwrap();
        assert!(!second.allowed);
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[tokio::test]
    async fn store_errors_fail_closed() {
        struct BrokenStore;

        #[async_trait::async_trait]
        impl EventGateStore for BrokenStore {
            async fn upsert(
                &self,
                _source: &str,
                _fingerprint: &str,
                _now: chrono::DateTime<Utc>,
                _window: std::time::Duration,
                _backoff: std::time::Duration,
                _min_count: u32,
            ) -> anyhow::Result<crate::store::GateState> {
                anyhow::bail!("store unavailable")
            }
        }

        let gate = EventGate::new(enabled_config()).with_store(Arc::new(BrokenStore));
        let err = gate
            .accept("alertmanager", &alert_payload("critical"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Store(_)));
    }
}
