//! Native window surface.
//!
//! The core never talks to a windowing toolkit directly. Showing windows,
//! the floating drag preview, the cursor and drop indicators all go through
//! [`WindowHost`]. [`HeadlessHost`] keeps everything in memory and records
//! the most recent calls, which is what the binary and the tests run against.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use super::main::AppWindow;
use super::registry::WindowId;
use super::{Point, Rect};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Window must be registered before it is shown")]
    Unregistered,
    #[error("Window {0} is already shown")]
    AlreadyShown(WindowId),
    #[error("Host refused to open a window: {0}")]
    Refused(String),
}

/// Floating preview window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewId(u64);

impl fmt::Display for PreviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragCursor {
    #[default]
    Default,
    Grabbing,
    /// Dropping here opens a new window
    Detach,
    NotAllowed,
}

pub trait WindowHost: Send + Sync {
    /// Show a registered window. The host keeps it alive until it closes.
    fn show_window(&self, window: Arc<AppWindow>) -> Result<(), HostError>;

    /// Close a shown window. Returns `false` for unknown ids.
    fn close_window(&self, id: WindowId) -> bool;

    fn focused_window(&self) -> Option<WindowId>;

    fn focus_window(&self, id: WindowId) -> bool;

    fn create_preview(&self, title: &str, frame: Rect) -> Result<PreviewId, HostError>;

    fn move_preview(&self, id: PreviewId, origin: Point);

    fn destroy_preview(&self, id: PreviewId);

    fn set_cursor(&self, cursor: DragCursor);

    /// Show the insertion marker before tab `index` of `window`
    fn show_drop_indicator(&self, window: WindowId, index: usize);

    fn hide_drop_indicator(&self);

    /// Offset from a window's frame origin to its client area
    fn chrome_inset(&self, window: WindowId) -> Point;

    /// Usable screen area for new windows
    fn screen_bounds(&self) -> Rect;
}

/// Every call made on a [`HeadlessHost`], in order
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    ShowWindow(WindowId),
    CloseWindow(WindowId),
    FocusWindow(WindowId),
    CreatePreview(PreviewId),
    MovePreview(PreviewId, Point),
    DestroyPreview(PreviewId),
    SetCursor(DragCursor),
    ShowDropIndicator { window: WindowId, index: usize },
    HideDropIndicator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRecord {
    pub title: String,
    pub frame: Rect,
}

#[derive(Default)]
struct HeadlessState {
    /// Shown windows, back to front
    windows: Vec<(WindowId, Arc<AppWindow>)>,
    focused: Option<WindowId>,
    previews: BTreeMap<PreviewId, PreviewRecord>,
    next_preview: u64,
    cursor: DragCursor,
    drop_indicator: Option<(WindowId, usize)>,
    calls: VecDeque<HostCall>,
}

/// Host calls kept by [`HeadlessHost`]; older ones are dropped
pub const MAX_RECORDED_CALLS: usize = 256;

/// In-memory window host
pub struct HeadlessHost {
    this: Weak<HeadlessHost>,
    state: Mutex<HeadlessState>,
    chrome_inset: Point,
    screen: Rect,
    refuse_next_show: AtomicBool,
}

/// Title bar height used when no inset is given
pub const DEFAULT_CHROME_INSET: Point = Point::new(0.0, 28.0);

impl HeadlessHost {
    pub fn new(screen: Rect) -> Arc<Self> {
        Self::with_chrome_inset(screen, DEFAULT_CHROME_INSET)
    }

    pub fn with_chrome_inset(screen: Rect, chrome_inset: Point) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: Mutex::new(HeadlessState::default()),
            chrome_inset,
            screen,
            refuse_next_show: AtomicBool::new(false),
        })
    }

    /// Make the next `show_window` fail (simulates the OS refusing a window)
    pub fn refuse_next_show(&self) {
        self.refuse_next_show.store(true, Ordering::Release);
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.state.lock().windows.iter().map(|(id, _)| *id).collect()
    }

    pub fn previews(&self) -> Vec<(PreviewId, PreviewRecord)> {
        self.state
            .lock()
            .previews
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }

    pub fn cursor(&self) -> DragCursor {
        self.state.lock().cursor
    }

    pub fn drop_indicator(&self) -> Option<(WindowId, usize)> {
        self.state.lock().drop_indicator
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.iter().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(state: &mut HeadlessState, call: HostCall) {
        if state.calls.len() == MAX_RECORDED_CALLS {
            state.calls.pop_front();
        }
        state.calls.push_back(call);
    }

    /// Drop the strong handle once the window has closed
    fn release(&self, id: WindowId) {
        let mut state = self.state.lock();
        state.windows.retain(|(window_id, _)| *window_id != id);
        if state.focused == Some(id) {
            state.focused = state.windows.last().map(|(window_id, _)| *window_id);
        }
        if state.drop_indicator.is_some_and(|(window, _)| window == id) {
            state.drop_indicator = None;
        }
    }
}

impl WindowHost for HeadlessHost {
    fn show_window(&self, window: Arc<AppWindow>) -> Result<(), HostError> {
        let id = window.id().ok_or(HostError::Unregistered)?;
        if self.refuse_next_show.swap(false, Ordering::AcqRel) {
            return Err(HostError::Refused("simulated failure".to_string()));
        }

        {
            let mut state = self.state.lock();
            if state.windows.iter().any(|(window_id, _)| *window_id == id) {
                return Err(HostError::AlreadyShown(id));
            }
            state.windows.push((id, Arc::clone(&window)));
            state.focused = Some(id);
            Self::record(&mut state, HostCall::ShowWindow(id));
        }

        let host = self.this.clone();
        window.on_close(Box::new(move |id| {
            if let Some(host) = host.upgrade() {
                host.release(id);
            }
        }));
        tracing::debug!(%id, "Window shown");
        Ok(())
    }

    fn close_window(&self, id: WindowId) -> bool {
        let window = {
            let mut state = self.state.lock();
            let position = state.windows.iter().position(|(window_id, _)| *window_id == id);
            let Some(position) = position else {
                return false;
            };
            Self::record(&mut state, HostCall::CloseWindow(id));
            state.windows[position].1.clone()
        };
        // Close listeners (including our own release) run without the host lock held
        window.close();
        self.release(id);
        true
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.state.lock().focused
    }

    fn focus_window(&self, id: WindowId) -> bool {
        let mut state = self.state.lock();
        let Some(position) = state.windows.iter().position(|(window_id, _)| *window_id == id) else {
            return false;
        };
        let entry = state.windows.remove(position);
        state.windows.push(entry);
        state.focused = Some(id);
        Self::record(&mut state, HostCall::FocusWindow(id));
        true
    }

    fn create_preview(&self, title: &str, frame: Rect) -> Result<PreviewId, HostError> {
        let mut state = self.state.lock();
        state.next_preview += 1;
        let id = PreviewId(state.next_preview);
        state.previews.insert(
            id,
            PreviewRecord {
                title: title.to_string(),
                frame,
            },
        );
        Self::record(&mut state, HostCall::CreatePreview(id));
        Ok(id)
    }

    fn move_preview(&self, id: PreviewId, origin: Point) {
        let mut state = self.state.lock();
        if let Some(record) = state.previews.get_mut(&id) {
            record.frame = record.frame.with_origin(origin);
            Self::record(&mut state, HostCall::MovePreview(id, origin));
        }
    }

    fn destroy_preview(&self, id: PreviewId) {
        let mut state = self.state.lock();
        if state.previews.remove(&id).is_some() {
            Self::record(&mut state, HostCall::DestroyPreview(id));
        }
    }

    fn set_cursor(&self, cursor: DragCursor) {
        let mut state = self.state.lock();
        if state.cursor != cursor {
            state.cursor = cursor;
            Self::record(&mut state, HostCall::SetCursor(cursor));
        }
    }

    fn show_drop_indicator(&self, window: WindowId, index: usize) {
        let mut state = self.state.lock();
        if state.drop_indicator != Some((window, index)) {
            state.drop_indicator = Some((window, index));
            Self::record(&mut state, HostCall::ShowDropIndicator { window, index });
        }
    }

    fn hide_drop_indicator(&self) {
        let mut state = self.state.lock();
        if state.drop_indicator.take().is_some() {
            Self::record(&mut state, HostCall::HideDropIndicator);
        }
    }

    fn chrome_inset(&self, _window: WindowId) -> Point {
        self.chrome_inset
    }

    fn screen_bounds(&self) -> Rect {
        self.screen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::main::tests::test_window;
    use crate::window::registry::WindowLifecycleManager;

    fn host() -> Arc<HeadlessHost> {
        HeadlessHost::new(Rect::new(0.0, 0.0, 1920.0, 1080.0))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_show_requires_registration() {
        let host = host();
        let window = test_window(&["a"]);
        assert_eq!(host.show_window(window), Err(HostError::Unregistered));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_host_keeps_window_alive_until_closed() {
        let host = host();
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        let id = registry.register_window(&window).unwrap();
        host.show_window(window).unwrap();

        assert_eq!(registry.active_window_count(), 1);
        assert_eq!(host.focused_window(), Some(id));

        assert!(host.close_window(id));
        assert!(host.window_ids().is_empty());
        assert_eq!(host.focused_window(), None);
        assert_eq!(registry.active_window_count(), 0);
        assert!(!host.close_window(id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_window_closed_elsewhere_is_released() {
        let host = host();
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        registry.register_window(&window).unwrap();
        host.show_window(Arc::clone(&window)).unwrap();

        window.close();
        drop(window);

        assert!(host.window_ids().is_empty());
        assert_eq!(registry.active_window_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_focus_moves_window_to_front() {
        let host = host();
        let registry = Arc::new(WindowLifecycleManager::new());
        let a = test_window(&["a"]);
        let b = test_window(&["b"]);
        let id_a = registry.register_window(&a).unwrap();
        let id_b = registry.register_window(&b).unwrap();
        host.show_window(a).unwrap();
        host.show_window(b).unwrap();
        assert_eq!(host.focused_window(), Some(id_b));

        assert!(host.focus_window(id_a));
        assert_eq!(host.window_ids(), [id_b, id_a]);
        assert_eq!(host.focused_window(), Some(id_a));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refused_show() {
        let host = host();
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        registry.register_window(&window).unwrap();

        host.refuse_next_show();
        assert!(matches!(
            host.show_window(Arc::clone(&window)),
            Err(HostError::Refused(_))
        ));
        // Only the next call fails
        host.show_window(window).unwrap();
    }

    #[test]
    fn test_preview_lifecycle() {
        let host = host();
        let preview = host
            .create_preview("docs", Rect::new(0.0, 0.0, 320.0, 200.0))
            .unwrap();
        host.move_preview(preview, Point::new(50.0, 60.0));

        let previews = host.previews();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].1.frame, Rect::new(50.0, 60.0, 320.0, 200.0));

        host.destroy_preview(preview);
        host.destroy_preview(preview);
        assert!(host.previews().is_empty());
        assert_eq!(
            host.calls(),
            vec![
                HostCall::CreatePreview(preview),
                HostCall::MovePreview(preview, Point::new(50.0, 60.0)),
                HostCall::DestroyPreview(preview),
            ]
        );
    }

    #[test]
    fn test_cursor_and_indicator_record_changes_only() {
        let host = host();
        let window = WindowId::from_parts(0, 1);

        host.set_cursor(DragCursor::Grabbing);
        host.set_cursor(DragCursor::Grabbing);
        host.show_drop_indicator(window, 2);
        host.show_drop_indicator(window, 2);
        host.hide_drop_indicator();
        host.hide_drop_indicator();

        assert_eq!(host.cursor(), DragCursor::Grabbing);
        assert_eq!(host.drop_indicator(), None);
        assert_eq!(
            host.calls(),
            vec![
                HostCall::SetCursor(DragCursor::Grabbing),
                HostCall::ShowDropIndicator { window, index: 2 },
                HostCall::HideDropIndicator,
            ]
        );
    }

    #[test]
    fn test_call_log_keeps_most_recent() {
        let host = host();
        let window = WindowId::from_parts(0, 1);

        for index in 0..MAX_RECORDED_CALLS + 10 {
            host.show_drop_indicator(window, index);
        }

        let calls = host.calls();
        assert_eq!(calls.len(), MAX_RECORDED_CALLS);
        assert_eq!(calls[0], HostCall::ShowDropIndicator { window, index: 10 });
        assert_eq!(
            calls.last(),
            Some(&HostCall::ShowDropIndicator {
                window,
                index: MAX_RECORDED_CALLS + 9
            })
        );
    }
}
