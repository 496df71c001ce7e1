//! Reorder, transfer and detach primitives.
//!
//! Each collection mutation is a single gated step on one window. A transfer
//! is two steps (take from the source, insert into the target); when the
//! second step fails the tab is put back where it came from.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::drag::DragError;
use crate::state::TabId;
use crate::window::host::WindowHost;
use crate::window::main::{AppWindow, CreateWindowParams, InitialTab, WindowSpawner};
use crate::window::{Point, Rect, TabStrip};

use super::service::{DetachedTab, TabError, TabManager};
use super::thread_safe::OperationError;

/// Tab boundary nearest to `client_x` (0 = before the first tab, `tab_count` = after the last)
pub fn drop_index(strip: &TabStrip, client_x: f64, tab_count: usize) -> usize {
    if tab_count == 0 {
        return 0;
    }
    let tab_width = strip.tab_width(tab_count);
    let raw = ((client_x - strip.bounds.left()) / tab_width).round();
    raw.clamp(0.0, tab_count as f64) as usize
}

/// Convert an insertion boundary into the destination index once the tab
/// at `source` has been removed from a collection of `tab_count` tabs.
pub fn index_after_removal(insert_at: usize, source: usize, tab_count: usize) -> usize {
    let last = tab_count.saturating_sub(1);
    if insert_at > source {
        (insert_at - 1).min(last)
    } else {
        insert_at.min(last)
    }
}

/// Performs structural tab moves through each window's gate
pub struct TabOperationsManager {
    host: Arc<dyn WindowHost>,
}

impl TabOperationsManager {
    pub fn new(host: Arc<dyn WindowHost>) -> Self {
        Self { host }
    }

    /// Insertion boundary under a screen point, or `None` if the window has no tab strip
    pub fn drop_index_at(&self, window: &AppWindow, screen: Point) -> Option<usize> {
        let id = window.id()?;
        let strip = window.tab_strip()?;
        let client = window.screen_to_client(screen, self.host.chrome_inset(id));
        Some(drop_index(&strip, client.x, window.tab_count()))
    }

    /// Move `tab` within its window so it lands at boundary `insert_at`.
    ///
    /// Returns the final index.
    pub async fn reorder_tab(
        &self,
        window: &AppWindow,
        tab: TabId,
        insert_at: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, OperationError> {
        let index = window
            .operations()
            .execute_safe("reorder_tab", cancel, move |tabs| {
                let source = tabs.index_of(tab).ok_or(TabError::NotFound(tab))?;
                let destination = index_after_removal(insert_at, source, tabs.count());
                tabs.move_tab(tab, destination)
            })
            .await??;
        tracing::debug!(%tab, index, "Tab reordered");
        Ok(index)
    }

    /// Move `tab` from `source` into `target` at boundary `insert_at`.
    ///
    /// Returns the index in the target.
    pub async fn transfer_tab(
        &self,
        source: &AppWindow,
        target: &AppWindow,
        tab: TabId,
        insert_at: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, DragError> {
        if source.id() == target.id() || std::ptr::eq(source, target) {
            return Err(DragError::SameWindow);
        }

        let (taken, detached) = self.take_for_move(source, tab, cancel).await?;
        let backup = detached.clone();

        match target
            .operations()
            .insert_tab_safe(detached, insert_at, cancel)
            .await
        {
            Ok(index) => {
                tracing::info!(%tab, source = ?source.id(), target = ?target.id(), index, "Tab transferred");
                Ok(index)
            }
            Err(e) => {
                tracing::warn!(%tab, %e, "Transfer failed, returning tab to its source");
                self.restore(source, backup, taken).await;
                Err(e.into())
            }
        }
    }

    /// Move `tab` out of `source` into a new window.
    ///
    /// `Some(frame)` places the window exactly; `None` uses the default frame,
    /// staggered away from existing windows.
    pub async fn detach_tab(
        &self,
        source: &AppWindow,
        tab: TabId,
        frame: Option<Rect>,
        spawner: &WindowSpawner,
        cancel: &CancellationToken,
    ) -> Result<Arc<AppWindow>, DragError> {
        let (taken, detached) = self.take_for_move(source, tab, cancel).await?;
        let backup = detached.clone();

        let params = CreateWindowParams {
            tabs: vec![InitialTab::Detached(detached)],
            skip_position_shift: frame.is_some(),
            frame,
        };
        match spawner.create_window(params) {
            Ok(window) => {
                tracing::info!(%tab, source = ?source.id(), window = ?window.id(), "Tab detached into new window");
                Ok(window)
            }
            Err(e) => {
                tracing::warn!(%tab, %e, "Detach failed, returning tab to its source");
                self.restore(source, backup, taken).await;
                Err(e.into())
            }
        }
    }

    /// Take a tab out of `source` for a move, keeping at least one tab behind
    async fn take_for_move(
        &self,
        source: &AppWindow,
        tab: TabId,
        cancel: &CancellationToken,
    ) -> Result<(TakenFrom, DetachedTab), DragError> {
        let taken = source
            .operations()
            .execute_safe("take_tab", cancel, move |tabs| {
                let index = tabs.index_of(tab).ok_or(TabError::NotFound(tab))?;
                if tabs.count() <= 1 {
                    return Ok(None);
                }
                let was_active = tabs.active_tab().map(|active| active.id) == Some(tab);
                let mut detached = tabs.take_tab(tab)?;
                detached.tab.end_drag();
                Ok::<_, TabError>(Some((TakenFrom { index, was_active }, detached)))
            })
            .await
            .map_err(DragError::from)?
            .map_err(OperationError::from)?;

        taken.ok_or(DragError::LastTab)
    }

    /// Put a tab back after a failed move, leaving activation as it was. Not cancellable.
    async fn restore(&self, source: &AppWindow, backup: DetachedTab, taken: TakenFrom) {
        let id = backup.id();
        let TakenFrom { index, was_active } = taken;
        let restored = source
            .operations()
            .execute_safe("restore_tab", &CancellationToken::new(), move |tabs| {
                tabs.return_tab(backup, index, was_active)
            })
            .await
            .and_then(|result| result.map_err(OperationError::from));
        if let Err(e) = restored {
            tracing::error!(%id, %e, "Failed to return tab to its source window");
        }
    }
}

/// Where a moving tab came from
#[derive(Debug, Clone, Copy)]
struct TakenFrom {
    index: usize,
    was_active: bool,
}
