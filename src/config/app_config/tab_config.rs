use serde::{Deserialize, Serialize};

/// Title given to tabs created without a path
pub const DEFAULT_NEW_TAB_TITLE: &str = "New Tab";

/// Configuration for tab collection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabConfig {
    /// Maximum tabs per window (None = unlimited)
    pub max_tabs: Option<usize>,
    /// Whether closing the last tab of a window is allowed
    pub allow_close_last_tab: bool,
    pub new_tab_title: String,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            max_tabs: None,
            allow_close_last_tab: false,
            new_tab_title: DEFAULT_NEW_TAB_TITLE.to_string(),
        }
    }
}
