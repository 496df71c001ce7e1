// Drag module - classifies tab drags and commits them
//
// Architecture
// ============
// One `TabDragDropService` per process holds at most one `DragOperation`.
// The host feeds it pointer positions in logical screen coordinates:
//
//   pointer down + move on a tab ──> start_drag
//   every pointer move          ──> update_drag  (classify, preview, indicator, live reorder)
//   pointer up                  ──> complete_drag (reorder / detach / transfer)
//   escape / focus loss         ──> cancel_drag
//
// Every collection change goes through the owning window's gate, including
// clearing the drag flags once a drag ends. Visual cleanup (preview,
// indicator, cursor) is tied to a drop guard so it runs however the
// completion ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::DragConfig;
use crate::state::TabId;
use crate::tabs::{index_after_removal, OperationError, TabError, TabManager, TabOperationsManager};
use crate::window::host::{DragCursor, PreviewId, WindowHost};
use crate::window::main::{AppWindow, WindowError, WindowSpawner};
use crate::window::preview::{preview_frame, DragPreview};
use crate::window::registry::{WindowId, WindowLifecycleManager};
use crate::window::{Point, Rect};

#[derive(Debug, Error)]
pub enum DragError {
    #[error("Cannot transfer a tab into its own window")]
    SameWindow,
    #[error("Window {0} has no tab strip")]
    NoTabStrip(WindowId),
    #[error("Window {0} is gone")]
    WindowGone(WindowId),
    #[error("Cannot move the last tab out of a window")]
    LastTab,
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// What releasing the pointer would do right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragOperationType {
    #[default]
    None,
    Reorder,
    Detach,
    Transfer,
}

/// The single in-progress tab drag
#[derive(Debug, Clone)]
pub struct DragOperation {
    drag_id: u64,
    pub source_window: WindowId,
    pub tab: TabId,
    pub tab_title: String,
    pub start_point: Point,
    pub current_point: Point,
    pub operation: DragOperationType,
    /// Floating preview while torn off
    pub preview: Option<PreviewId>,
    pub original_index: usize,
    /// Index in the source after live reordering
    pub current_index: usize,
    pub target_window: Option<WindowId>,
    pub drop_index: Option<usize>,
    cancel: CancellationToken,
}

impl DragOperation {
    pub fn is_torn_off(&self) -> bool {
        self.preview.is_some()
    }
}

// ============================================================================
// Window Hit Testing
// ============================================================================

/// Find the window under the given screen point
///
/// If multiple windows overlap, the `current_focus` window takes priority.
pub fn find_window_at_point(
    windows: &[Arc<AppWindow>],
    point: Point,
    current_focus: Option<WindowId>,
    exclude: Option<WindowId>,
) -> Option<Arc<AppWindow>> {
    let candidates = || {
        windows
            .iter()
            .filter(move |window| window.id().is_some() && window.id() != exclude)
            .filter(move |window| window.frame().contains(point))
    };

    // Prioritize currently focused window in overlapping areas
    if let Some(focused) = current_focus {
        if let Some(window) = candidates().find(|window| window.id() == Some(focused)) {
            return Some(Arc::clone(window));
        }
    }
    // Later windows are on top
    candidates().last().cloned()
}

// ============================================================================
// Drag service
// ============================================================================

pub struct TabDragDropService {
    config: DragConfig,
    registry: Arc<WindowLifecycleManager>,
    host: Arc<dyn WindowHost>,
    spawner: Arc<WindowSpawner>,
    operations: TabOperationsManager,
    preview: DragPreview,
    state: Mutex<Option<DragOperation>>,
    next_drag_id: AtomicU64,
}

/// Visual cleanup that runs however a drag ends
struct DragCleanup<'a> {
    service: &'a TabDragDropService,
}

impl Drop for DragCleanup<'_> {
    fn drop(&mut self) {
        self.service.reset_visuals();
    }
}

impl TabDragDropService {
    pub fn new(
        config: DragConfig,
        registry: Arc<WindowLifecycleManager>,
        host: Arc<dyn WindowHost>,
        spawner: Arc<WindowSpawner>,
    ) -> Self {
        Self {
            operations: TabOperationsManager::new(Arc::clone(&host)),
            preview: DragPreview::new(Arc::clone(&host)),
            config,
            registry,
            host,
            spawner,
            state: Mutex::new(None),
            next_drag_id: AtomicU64::new(1),
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Snapshot of the current drag
    pub fn current_drag(&self) -> Option<DragOperation> {
        self.state.lock().clone()
    }

    /// Begin dragging `tab` out of `source_window`.
    ///
    /// Refused (`false`) when the window has one tab or fewer, or the tab is
    /// not in it. Any drag already in progress is cancelled first.
    pub async fn start_drag(&self, tab: TabId, start_point: Point, source_window: WindowId) -> bool {
        if self.is_dragging() {
            self.cancel_drag().await;
        }

        let Some(window) = self.registry.find_window(source_window) else {
            tracing::debug!(%source_window, "Drag refused: source window not found");
            return false;
        };

        let cancel = CancellationToken::new();
        let started = window
            .operations()
            .execute_safe("begin_drag", &cancel, move |tabs| {
                if tabs.count() <= 1 {
                    return None;
                }
                let title = tabs.tab(tab)?.title.clone();
                let index = tabs.begin_tab_drag(tab, source_window).ok()?;
                Some((index, title))
            })
            .await;

        let (index, tab_title) = match started {
            Ok(Some(started)) => started,
            Ok(None) => {
                tracing::debug!(%tab, %source_window, "Drag refused");
                return false;
            }
            Err(e) => {
                tracing::warn!(%tab, %e, "Failed to start drag");
                return false;
            }
        };

        let drag = DragOperation {
            drag_id: self.next_drag_id.fetch_add(1, Ordering::Relaxed),
            source_window,
            tab,
            tab_title,
            start_point,
            current_point: start_point,
            operation: DragOperationType::None,
            preview: None,
            original_index: index,
            current_index: index,
            target_window: None,
            drop_index: None,
            cancel,
        };
        let previous = self.state.lock().replace(drag);
        if let Some(previous) = previous {
            // Another start_drag won the race to the state slot
            previous.cancel.cancel();
            if previous.tab != tab {
                self.end_drag_flags(previous.tab).await;
            }
        }
        self.host.set_cursor(DragCursor::Grabbing);
        tracing::debug!(%tab, %source_window, index, "Drag started");
        true
    }

    /// Classify the current drag at `current_point` without changing anything
    pub fn get_operation_type(&self, current_point: Point) -> DragOperationType {
        match self.current_drag() {
            Some(drag) => self.classify(&drag, current_point).0,
            None => DragOperationType::None,
        }
    }

    /// Track a pointer move. Returns the new classification.
    pub async fn update_drag(&self, current_point: Point) -> DragOperationType {
        let Some(mut drag) = self.current_drag() else {
            return DragOperationType::None;
        };

        let (operation, target) = self.classify(&drag, current_point);
        if operation != drag.operation {
            tracing::trace!(from = ?drag.operation, to = ?operation, "Drag operation changed");
        }

        // Preview exists exactly while the drag is a detach
        if operation == DragOperationType::Detach {
            if drag.preview.is_none() {
                drag.preview = self.preview.show(&drag.tab_title, current_point, &self.config);
            } else {
                self.preview.update_position(current_point);
            }
        } else if drag.preview.take().is_some() {
            self.preview.close();
        }

        self.host.set_cursor(match operation {
            DragOperationType::Reorder | DragOperationType::Transfer => DragCursor::Grabbing,
            DragOperationType::Detach => DragCursor::Detach,
            DragOperationType::None => DragCursor::NotAllowed,
        });

        let indicator_window = match operation {
            DragOperationType::Reorder => self.registry.find_window(drag.source_window),
            DragOperationType::Transfer => target.clone(),
            _ => None,
        };
        let drop_index = indicator_window
            .as_ref()
            .and_then(|window| Some((window.id()?, self.operations.drop_index_at(window, current_point)?)));
        match drop_index {
            Some((window, index)) => self.host.show_drop_indicator(window, index),
            None => self.host.hide_drop_indicator(),
        }

        if operation == DragOperationType::Reorder && self.config.live_reorder {
            if let (Some(source), Some((_, insert_at))) = (indicator_window.as_ref(), drop_index) {
                match self.live_reorder(source, &drag, insert_at).await {
                    Ok(index) => drag.current_index = index,
                    Err(e) => {
                        tracing::warn!(tab = %drag.tab, %e, "Live reorder failed, cancelling drag");
                        self.cancel_drag().await;
                        return DragOperationType::None;
                    }
                }
            }
        }

        drag.current_point = current_point;
        drag.operation = operation;
        drag.target_window = target.and_then(|window| window.id());
        drag.drop_index = drop_index.map(|(_, index)| index);

        // Skip if the drag ended while we were awaiting
        if let Some(current) = self.state.lock().as_mut() {
            if current.drag_id == drag.drag_id {
                *current = drag;
            }
        }
        operation
    }

    /// Commit the drag at `drop_point`. Returns whether the tab moved.
    ///
    /// `target_window` overrides the window found during the last update for transfers.
    pub async fn complete_drag(&self, target_window: Option<WindowId>, drop_point: Point) -> bool {
        let Some(drag) = self.state.lock().take() else {
            return false;
        };
        let _cleanup = DragCleanup { service: self };

        let result = match drag.operation {
            DragOperationType::Reorder => self.complete_reorder(&drag, drop_point).await,
            DragOperationType::Detach => self.complete_detach(&drag, drop_point).await,
            DragOperationType::Transfer => {
                let target = target_window.or(drag.target_window);
                self.complete_transfer(&drag, target, drop_point).await
            }
            DragOperationType::None => Ok(false),
        };

        let moved = match result {
            Ok(true) => {
                tracing::debug!(tab = %drag.tab, operation = ?drag.operation, "Drag completed");
                true
            }
            Ok(false) => {
                tracing::debug!(tab = %drag.tab, operation = ?drag.operation, "Drag dropped without effect");
                self.revert_live_reorder(&drag).await;
                false
            }
            Err(e) => {
                tracing::warn!(tab = %drag.tab, operation = ?drag.operation, %e, "Drag failed, treating as cancel");
                self.revert_live_reorder(&drag).await;
                false
            }
        };
        self.end_drag_flags(drag.tab).await;
        moved
    }

    /// Abandon the drag, moving a live-reordered tab back where it started
    pub async fn cancel_drag(&self) {
        let Some(drag) = self.state.lock().take() else {
            return;
        };
        drag.cancel.cancel();
        let _cleanup = DragCleanup { service: self };
        self.revert_live_reorder(&drag).await;
        self.end_drag_flags(drag.tab).await;
        tracing::debug!(tab = %drag.tab, "Drag cancelled");
    }

    // ========================================================================
    // Classification
    // ========================================================================

    fn classify(&self, drag: &DragOperation, point: Point) -> (DragOperationType, Option<Arc<AppWindow>>) {
        // 1. Inside the source strip
        if let Some(source) = self.registry.find_window(drag.source_window) {
            if let Some(strip) = source.tab_strip() {
                let client = source.screen_to_client(point, self.host.chrome_inset(drag.source_window));
                if strip.bounds.inflate(self.config.strip_hit_padding).contains(client) {
                    return (DragOperationType::Reorder, None);
                }
            }
        }

        // 2. Over another window's tab strip band
        let windows = self.registry.get_active_windows();
        let focused = self.registry.last_focused_window();
        if let Some(target) = find_window_at_point(&windows, point, focused, Some(drag.source_window)) {
            if self.in_transfer_band(&target, point) {
                return (DragOperationType::Transfer, Some(target));
            }
        }

        // 3. Far enough from the start
        if drag.start_point.distance_to(point) > self.config.detach_threshold {
            return (DragOperationType::Detach, None);
        }

        (DragOperationType::None, None)
    }

    fn in_transfer_band(&self, window: &AppWindow, point: Point) -> bool {
        let (Some(id), Some(strip)) = (window.id(), window.tab_strip()) else {
            return false;
        };
        let client = window.screen_to_client(point, self.host.chrome_inset(id));
        let bounds = strip.bounds;
        client.x >= bounds.left()
            && client.x < bounds.right()
            && client.y >= bounds.top()
            && client.y < bounds.top() + self.config.tab_strip_height
    }

    // ========================================================================
    // Completion
    // ========================================================================

    async fn complete_reorder(&self, drag: &DragOperation, drop_point: Point) -> Result<bool, DragError> {
        let source = self.source_window(drag)?;
        let insert_at = self
            .operations
            .drop_index_at(&source, drop_point)
            .ok_or(DragError::NoTabStrip(drag.source_window))?;
        self.operations
            .reorder_tab(&source, drag.tab, insert_at, &drag.cancel)
            .await?;
        Ok(true)
    }

    async fn complete_detach(&self, drag: &DragOperation, drop_point: Point) -> Result<bool, DragError> {
        let source = self.source_window(drag)?;
        self.preview.close();

        let size = self.spawner.default_frame();
        let origin = preview_frame(drop_point, &self.config).origin();
        let frame = Rect::new(origin.x, origin.y, size.width, size.height);

        let window = self
            .operations
            .detach_tab(&source, drag.tab, Some(frame), &self.spawner, &drag.cancel)
            .await?;
        if let Some(id) = window.id() {
            self.host.focus_window(id);
            self.registry.set_focused_window(id);
        }
        Ok(true)
    }

    async fn complete_transfer(
        &self,
        drag: &DragOperation,
        target: Option<WindowId>,
        drop_point: Point,
    ) -> Result<bool, DragError> {
        let Some(target_id) = target else {
            return Ok(false);
        };
        if target_id == drag.source_window {
            tracing::debug!(%target_id, "Transfer refused: target is the source window");
            return Ok(false);
        }

        let source = self.source_window(drag)?;
        let target = self
            .registry
            .find_window(target_id)
            .ok_or(DragError::WindowGone(target_id))?;
        let Some(insert_at) = self.operations.drop_index_at(&target, drop_point) else {
            tracing::debug!(%target_id, "Transfer refused: target has no tab strip");
            return Ok(false);
        };

        self.operations
            .transfer_tab(&source, &target, drag.tab, insert_at, &drag.cancel)
            .await?;
        self.host.focus_window(target_id);
        self.registry.set_focused_window(target_id);
        Ok(true)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn source_window(&self, drag: &DragOperation) -> Result<Arc<AppWindow>, DragError> {
        self.registry
            .find_window(drag.source_window)
            .ok_or(DragError::WindowGone(drag.source_window))
    }

    async fn live_reorder(&self, source: &AppWindow, drag: &DragOperation, insert_at: usize) -> Result<usize, OperationError> {
        let tab = drag.tab;
        source
            .operations()
            .execute_safe("live_reorder", &drag.cancel, move |tabs| {
                let current = tabs.index_of(tab).ok_or(TabError::NotFound(tab))?;
                let destination = index_after_removal(insert_at, current, tabs.count());
                if destination == current {
                    return Ok(current);
                }
                tabs.move_tab(tab, destination)
            })
            .await?
            .map_err(OperationError::from)
    }

    async fn revert_live_reorder(&self, drag: &DragOperation) {
        if drag.current_index == drag.original_index {
            return;
        }
        let Some(source) = self.registry.find_window(drag.source_window) else {
            return;
        };
        let (tab, index) = (drag.tab, drag.original_index);
        let reverted = source
            .operations()
            .execute_safe("revert_reorder", &CancellationToken::new(), move |tabs| {
                // Only if the tab is still in its source
                tabs.index_of(tab).map(|_| tabs.move_tab(tab, index))
            })
            .await;
        if let Err(e) = reverted {
            tracing::warn!(%tab, %e, "Failed to restore tab position");
        }
    }

    /// Clear `tab`'s drag flags in whichever window now holds it. Not cancellable.
    async fn end_drag_flags(&self, tab: TabId) {
        for window in self.registry.get_active_windows() {
            let ended = window
                .operations()
                .execute_safe("end_drag", &CancellationToken::new(), move |tabs| {
                    tabs.end_tab_drag(tab)
                })
                .await;
            match ended {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => tracing::warn!(%tab, window = ?window.id(), %e, "Failed to clear drag flags"),
            }
        }
    }

    fn reset_visuals(&self) {
        self.preview.close();
        self.host.hide_drop_indicator();
        self.host.set_cursor(DragCursor::Default);
    }
}
