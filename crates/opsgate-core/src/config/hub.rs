//! Notification hub configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the in-process notification hubs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Per-subscriber channel capacity. Full channels drop events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Log lines retained per execution for late subscribers.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Maximum number of distinct execution keys before eviction.
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            history_limit: default_history_limit(),
            max_keys: default_max_keys(),
        }
    }
}

fn default_channel_capacity() -> usize {
    8
}

fn default_history_limit() -> usize {
    200
}

fn default_max_keys() -> usize {
    500
}
