use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::window::registry::WindowId;

/// Opaque, immutable tab identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token for the tab's view payload (owned by the UI layer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(pub u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseColorError {
    #[error("Color must be in #RRGGBB form: {0}")]
    InvalidFormat(String),
}

/// Custom tab color override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TabColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl TabColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for TabColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for TabColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseColorError::InvalidFormat(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for TabColor {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TabColor> for String {
    fn from(color: TabColor) -> Self {
        color.to_string()
    }
}

/// Options for creating a tab
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabOptions {
    /// Activate the new tab (the first tab of a collection is always activated)
    pub activate: bool,
    pub pinned: bool,
    pub color: Option<TabColor>,
    pub content: Option<ContentHandle>,
    /// Insert position (None = append at end)
    pub index: Option<usize>,
}

impl TabOptions {
    pub fn activated() -> Self {
        Self {
            activate: true,
            ..Default::default()
        }
    }
}

/// A single tab in a window's tab strip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabModel {
    pub id: TabId,
    pub title: String,
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub content: Option<ContentHandle>,
    pub is_pinned: bool,
    pub is_active: bool,
    pub has_unsaved_changes: bool,
    pub is_dragging: bool,
    pub custom_color: Option<TabColor>,
    pub created_at: DateTime<Utc>,
    pub last_activated: Option<DateTime<Utc>>,
    /// Explicit close policy; None falls back to the pinned/unsaved rule
    #[serde(skip)]
    pub can_close_override: Option<bool>,
    // Drag-only fields, cleared when the drag ends
    #[serde(skip)]
    pub source_window: Option<WindowId>,
    #[serde(skip)]
    pub original_index: Option<usize>,
}

impl TabModel {
    pub fn new(title: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            id: TabId::new(),
            title: title.into(),
            path,
            content: None,
            is_pinned: false,
            is_active: false,
            has_unsaved_changes: false,
            is_dragging: false,
            custom_color: None,
            created_at: Utc::now(),
            last_activated: None,
            can_close_override: None,
            source_window: None,
            original_index: None,
        }
    }

    pub fn has_custom_color(&self) -> bool {
        self.custom_color.is_some()
    }

    /// Whether a non-forced close is allowed
    ///
    /// Pinned tabs with unsaved changes refuse to close unless overridden.
    pub fn can_close(&self) -> bool {
        self.can_close_override
            .unwrap_or(!(self.is_pinned && self.has_unsaved_changes))
    }

    pub fn set_can_close(&mut self, value: Option<bool>) {
        self.can_close_override = value;
    }

    /// Copy of this tab with a fresh identity and per-instance state reset
    pub fn duplicate(&self) -> Self {
        Self {
            id: TabId::new(),
            title: self.title.clone(),
            path: self.path.clone(),
            content: self.content,
            is_pinned: self.is_pinned,
            is_active: false,
            has_unsaved_changes: false,
            is_dragging: false,
            custom_color: self.custom_color,
            created_at: Utc::now(),
            last_activated: None,
            can_close_override: self.can_close_override,
            source_window: None,
            original_index: None,
        }
    }

    pub fn begin_drag(&mut self, source_window: WindowId, index: usize) {
        self.is_dragging = true;
        self.source_window = Some(source_window);
        self.original_index = Some(index);
    }

    pub fn end_drag(&mut self) {
        self.is_dragging = false;
        self.source_window = None;
        self.original_index = None;
    }

    /// Point this tab at a new location, retitling it after the path
    pub fn navigate_to(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.title = display_name_for(&path);
        self.path = Some(path);
    }
}

/// Display name for a path (used for tab titles)
pub fn display_name_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
