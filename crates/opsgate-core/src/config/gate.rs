//! Webhook event gate configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the webhook event dedup gate.
///
/// Both `dedup_window_secs` and `window_secs` are accepted on the wire;
/// `window_secs` is the operative value and `dedup_window_secs` only fills
/// it in when the former is absent (see [`EventGateConfig::effective_window`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventGateConfig {
    /// Whether the gate is enabled at all. Disabled gates fail open.
    #[serde(default)]
    pub enabled: bool,

    /// Severity allow-list. Empty means no severity filtering.
    #[serde(default)]
    pub severities: Vec<String>,

    /// Legacy alias for `window_secs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_window_secs: Option<u64>,

    /// Dedup window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Post-trigger backoff in seconds.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Number of repeats within the window before the gate opens.
    #[serde(default = "default_min_count")]
    pub min_count: u32,
}

impl EventGateConfig {
    /// The dedup window actually passed to the backing store.
    ///
    /// `window_secs` wins; `dedup_window_secs` is honored only when
    /// `window_secs` was left at its default and the legacy field was set.
    pub fn effective_window(&self) -> Duration {
        if self.window_secs == default_window_secs() {
            if let Some(legacy) = self.dedup_window_secs {
                return Duration::from_secs(legacy);
            }
        }
        Duration::from_secs(self.window_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for EventGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            severities: Vec::new(),
            dedup_window_secs: None,
            window_secs: default_window_secs(),
            backoff_secs: default_backoff_secs(),
            min_count: default_min_count(),
        }
    }
}

fn default_window_secs() -> u64 {
    300
}

fn default_backoff_secs() -> u64 {
    600
}

fn default_min_count() -> u32 {
    1
}
