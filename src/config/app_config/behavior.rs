use serde::{Deserialize, Serialize};

/// Behavior on app startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupBehavior {
    /// Use the configured default
    #[default]
    Default,
    /// Reuse what the last closed window had
    LastClosed,
}
