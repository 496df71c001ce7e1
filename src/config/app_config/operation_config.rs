use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for gated tab operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationConfig {
    /// How long `dispose` waits for the in-flight operation before forcing the gate closed
    pub dispose_timeout_ms: u64,
}

impl OperationConfig {
    pub fn dispose_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_timeout_ms)
    }
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            dispose_timeout_ms: 2000,
        }
    }
}
