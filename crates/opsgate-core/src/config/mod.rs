//! Configuration types for Opsgate.
//!
//! This module provides the unified configuration used across all Opsgate
//! crates. Configuration is loaded from a single YAML file (opsgate.yaml)
//! and combined into an `OpsgateConfig` structure; every section has
//! sensible defaults so a missing section is never an error.

pub mod approval;
pub mod audit;
pub mod gate;
pub mod hub;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use approval::ApprovalConfig;
pub use audit::AuditConfig;
pub use gate::EventGateConfig;
pub use hub::HubConfig;
pub use policy::PolicyConfig;

/// Complete Opsgate configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpsgateConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// Configuration version.
    #[serde(default)]
    pub version: Option<String>,

    /// Policy engine settings.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Approval workflow settings.
    #[serde(default)]
    pub approvals: ApprovalConfig,

    /// Webhook event gate settings.
    #[serde(default)]
    pub event_gate: EventGateConfig,

    /// Notification hub settings.
    #[serde(default)]
    pub hubs: HubConfig,

    /// Audit logging settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl OpsgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(ConfigError::Parse)
    }
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
