use serde::{Deserialize, Serialize};

use super::behavior::StartupBehavior;

/// Offset applied to stagger new windows that would open on top of existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPositionOffset {
    pub x: i32,
    pub y: i32,
}

impl Default for WindowPositionOffset {
    fn default() -> Self {
        Self { x: 20, y: 20 }
    }
}

/// Window position in logical screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowPosition {
    pub x: f64,
    pub y: f64,
}

impl Default for WindowPosition {
    fn default() -> Self {
        Self { x: 100.0, y: 100.0 }
    }
}

/// Configuration for window position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowPositionConfig {
    pub default_position: WindowPosition,
    pub position_offset: WindowPositionOffset,
    /// Bounds new windows are kept inside when staggering
    pub screen_width: f64,
    pub screen_height: f64,
    /// Behavior on app startup: "default" or "last_closed"
    pub on_startup: StartupBehavior,
}

impl Default for WindowPositionConfig {
    fn default() -> Self {
        Self {
            default_position: WindowPosition::default(),
            position_offset: WindowPositionOffset::default(),
            screen_width: 1920.0,
            screen_height: 1080.0,
            on_startup: StartupBehavior::default(),
        }
    }
}
