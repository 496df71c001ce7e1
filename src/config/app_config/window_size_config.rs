use serde::{Deserialize, Serialize};

use super::behavior::StartupBehavior;

/// Window size in logical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 800.0,
        }
    }
}

/// Configuration for window size
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowSizeConfig {
    pub default_size: WindowSize,
    /// Behavior on app startup: "default" or "last_closed"
    pub on_startup: StartupBehavior,
}
