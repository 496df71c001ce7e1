use serde::{Deserialize, Serialize};

use crate::window::Point;

/// Distance from the drag start beyond which a drop detaches the tab
pub const DEFAULT_DETACH_THRESHOLD: f64 = 40.0;

/// Height of the band at the top of a target window that accepts transfers
pub const DEFAULT_TAB_STRIP_HEIGHT: f64 = 50.0;

/// Widest a tab gets in the strip
pub const DEFAULT_MAX_TAB_WIDTH: f64 = 240.0;

/// Configuration for tab drag-and-drop
///
/// All distances are logical units. Hosts convert physical pixels before
/// handing points to the drag service, so these values do not need to
/// scale with display density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DragConfig {
    pub detach_threshold: f64,
    pub tab_strip_height: f64,
    /// Extra hit area around the source tab strip (makes reordering less finicky)
    pub strip_hit_padding: f64,
    /// Offset from the cursor to the preview/new window origin
    pub preview_inset: Point,
    pub preview_width: f64,
    pub preview_height: f64,
    /// Move the tab inside its own strip while the pointer moves
    pub live_reorder: bool,
    pub max_tab_width: f64,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            detach_threshold: DEFAULT_DETACH_THRESHOLD,
            tab_strip_height: DEFAULT_TAB_STRIP_HEIGHT,
            strip_hit_padding: 0.0,
            preview_inset: Point::new(20.0, 10.0),
            preview_width: 320.0,
            preview_height: 200.0,
            live_reorder: true,
            max_tab_width: DEFAULT_MAX_TAB_WIDTH,
        }
    }
}
