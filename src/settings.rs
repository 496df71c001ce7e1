//! Key/value settings persisted as a single JSON object.
//!
//! Reads never fail: a missing key, a missing file or a value of the wrong
//! shape all give the caller's default, with a log line for the latter two.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Frame of the last focused window, restored for the first window at startup
pub const LAST_WINDOW_FRAME_KEY: &str = "lastWindowFrame";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings storage (saved to settings.json)
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl Settings {
    /// Get the default settings file path
    pub fn default_path() -> PathBuf {
        const FILENAME: &str = "settings.json";
        if let Some(mut path) = dirs::data_local_dir() {
            path.push("explorer-pro");
            path.push(FILENAME);
            return path;
        }

        // Fallback to home directory
        if let Some(mut path) = dirs::home_dir() {
            path.push(".explorer-pro");
            path.push(FILENAME);
            return path;
        }

        PathBuf::from(FILENAME)
    }

    /// Load settings from `path`, starting empty if the file is missing or unreadable
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(path = %path.display(), %e, "Invalid settings file, using defaults");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                Map::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), %e, "Failed to read settings file, using defaults");
                Map::new()
            }
        };
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value stored under `key`, or `default` if absent or of the wrong shape
    pub fn get_setting<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(value) = self.values.read().get(key).cloned() else {
            return default;
        };
        match serde_json::from_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, %e, "Setting has unexpected shape, using default");
                default
            }
        }
    }

    /// Store `value` under `key` in memory. Returns `false` if it cannot be encoded.
    pub fn update_setting<T: Serialize>(&self, key: &str, value: T) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.values.write().insert(key.to_string(), value);
                tracing::trace!(key, "Setting updated");
                true
            }
            Err(e) => {
                tracing::warn!(key, %e, "Failed to encode setting");
                false
            }
        }
    }

    pub fn remove_setting(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    pub fn try_save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&*self.values.read())?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Write settings to disk. Returns whether the write succeeded.
    pub fn save_settings(&self) -> bool {
        match self.try_save() {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Settings saved");
                true
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), %e, "Failed to save settings");
                false
            }
        }
    }
}
