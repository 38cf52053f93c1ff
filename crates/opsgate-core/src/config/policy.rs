//! Policy engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the risk/policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Allow read actions when no policy checker is configured or the
    /// checker is unreachable. Write actions never fail open.
    #[serde(default = "default_fail_open_reads")]
    pub fail_open_reads: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fail_open_reads: default_fail_open_reads(),
        }
    }
}

fn default_fail_open_reads() -> bool {
    true
}
