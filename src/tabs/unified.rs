//! Index-based view of a window's tabs for surfaces that address tabs by position.
//!
//! Nothing is mirrored: every `LegacyTabItem` is computed from the live
//! collection on demand, and every index-based command is resolved to a
//! `TabId` inside the gated body, so the index always refers to the
//! collection the command actually mutates.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::TabEvent;
use crate::state::{TabId, TabModel};

use super::service::{TabError, TabManager, TabManagerService};
use super::thread_safe::{OperationError, ThreadSafeTabOperations};

/// Flat, positional tab record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTabItem {
    pub index: usize,
    pub id: TabId,
    pub title: String,
    pub path: Option<PathBuf>,
    pub is_active: bool,
    pub is_pinned: bool,
    pub has_unsaved_changes: bool,
    /// `#RRGGBB`
    pub color: Option<String>,
    pub can_close: bool,
}

/// Projection from `TabModel` to `LegacyTabItem`
pub struct TabModelAdapter;

impl TabModelAdapter {
    pub fn to_item(index: usize, tab: &TabModel) -> LegacyTabItem {
        LegacyTabItem {
            index,
            id: tab.id,
            title: tab.title.clone(),
            path: tab.path.clone(),
            is_active: tab.is_active,
            is_pinned: tab.is_pinned,
            has_unsaved_changes: tab.has_unsaved_changes,
            color: tab.custom_color.map(|color| color.to_string()),
            can_close: tab.can_close(),
        }
    }

    /// Project the whole collection, in visual order
    pub fn project(manager: &impl TabManager) -> Vec<LegacyTabItem> {
        manager
            .tabs()
            .iter()
            .enumerate()
            .map(|(index, tab)| Self::to_item(index, tab))
            .collect()
    }

    /// Resolve a position to the tab currently there
    pub fn resolve(manager: &impl TabManager, index: usize) -> Result<TabId, TabError> {
        manager
            .tabs()
            .get(index)
            .map(|tab| tab.id)
            .ok_or(TabError::NoTabAt(index))
    }
}

/// Positional commands over one window's gated tab operations
#[derive(Clone)]
pub struct UnifiedTabService {
    operations: ThreadSafeTabOperations,
}

impl UnifiedTabService {
    pub fn new(operations: ThreadSafeTabOperations) -> Self {
        Self { operations }
    }

    pub fn items(&self) -> Vec<LegacyTabItem> {
        TabModelAdapter::project(&*self.operations.manager().lock())
    }

    pub fn item_at(&self, index: usize) -> Option<LegacyTabItem> {
        let manager = self.operations.manager().lock();
        manager
            .tabs()
            .get(index)
            .map(|tab| TabModelAdapter::to_item(index, tab))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.operations.manager().lock().active_index()
    }

    /// Re-read `items()` whenever this fires
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.operations.manager().lock().subscribe()
    }

    pub async fn close_at(
        &self,
        index: usize,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, OperationError> {
        self.at(index, "close_at", cancel, move |tabs, id| tabs.close_tab(id, force))
            .await
    }

    pub async fn activate_at(&self, index: usize, cancel: &CancellationToken) -> Result<bool, OperationError> {
        self.at(index, "activate_at", cancel, |tabs, id| tabs.activate_tab(id))
            .await
    }

    /// Move the tab at `from` to index `to`. Returns the final index.
    pub async fn move_at(
        &self,
        from: usize,
        to: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, OperationError> {
        self.at(from, "move_at", cancel, move |tabs, id| tabs.move_tab(id, to))
            .await
    }

    pub async fn rename_at(
        &self,
        index: usize,
        title: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let title = title.into();
        self.at(index, "rename_at", cancel, move |tabs, id| tabs.rename_tab(id, title))
            .await
    }

    pub async fn set_pinned_at(
        &self,
        index: usize,
        pinned: bool,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        self.at(index, "set_pinned_at", cancel, move |tabs, id| {
            tabs.set_tab_pinned(id, pinned)
        })
        .await
    }

    async fn at<F, R>(
        &self,
        index: usize,
        name: &'static str,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<R, OperationError>
    where
        F: FnOnce(&mut TabManagerService, TabId) -> Result<R, TabError> + Send + 'static,
        R: Send + 'static,
    {
        Ok(self
            .operations
            .execute_safe(name, cancel, move |tabs| {
                let id = TabModelAdapter::resolve(&*tabs, index)?;
                f(tabs, id)
            })
            .await??)
    }
}
