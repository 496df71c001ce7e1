use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::config::{Config, WindowPositionOffset};
use crate::state::{display_name_for, TabOptions};
use crate::tabs::{
    DetachedTab, SharedTabManager, TabError, TabManager, TabManagerService, TabPolicy,
    ThreadSafeTabOperations,
};
use crate::ui_thread::UiDispatcher;

use super::host::{HostError, WindowHost};
use super::registry::{RegistryError, WindowId, WindowLifecycleManager};
use super::{Point, Rect, TabStrip};

const MAX_POSITION_SHIFT_ATTEMPTS: usize = 20;

/// Height of the tab strip at the top of a window's client area
pub const TAB_STRIP_HEIGHT: f64 = 36.0;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error(transparent)]
    Tab(#[from] TabError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Host(#[from] HostError),
}

pub type CloseListener = Box<dyn FnOnce(WindowId) + Send>;

/// A top-level explorer window: one tab collection plus its geometry
pub struct AppWindow {
    id: OnceLock<WindowId>,
    operations: ThreadSafeTabOperations,
    /// Outer frame in screen coordinates
    frame: RwLock<Rect>,
    /// Tab strip in client coordinates
    tab_strip: RwLock<Option<TabStrip>>,
    closed: AtomicBool,
    close_listeners: Mutex<Vec<CloseListener>>,
}

impl AppWindow {
    pub fn new(operations: ThreadSafeTabOperations, frame: Rect, tab_strip: Option<TabStrip>) -> Arc<Self> {
        Arc::new(Self {
            id: OnceLock::new(),
            operations,
            frame: RwLock::new(frame),
            tab_strip: RwLock::new(tab_strip),
            closed: AtomicBool::new(false),
            close_listeners: Mutex::new(Vec::new()),
        })
    }

    /// Registry-assigned id (None until registered)
    pub fn id(&self) -> Option<WindowId> {
        self.id.get().copied()
    }

    pub(crate) fn assign_id(&self, id: WindowId) -> bool {
        self.id.set(id).is_ok()
    }

    pub fn tabs(&self) -> &SharedTabManager {
        self.operations.manager()
    }

    pub fn operations(&self) -> &ThreadSafeTabOperations {
        &self.operations
    }

    pub fn tab_count(&self) -> usize {
        self.tabs().lock().count()
    }

    pub fn frame(&self) -> Rect {
        *self.frame.read()
    }

    pub fn set_frame(&self, frame: Rect) {
        *self.frame.write() = frame;
    }

    pub fn tab_strip(&self) -> Option<TabStrip> {
        *self.tab_strip.read()
    }

    pub fn set_tab_strip(&self, tab_strip: Option<TabStrip>) {
        *self.tab_strip.write() = tab_strip;
    }

    /// Convert a screen point into this window's client coordinates
    pub fn screen_to_client(&self, screen: Point, chrome_inset: Point) -> Point {
        let origin = self.frame().origin();
        Point::new(
            screen.x - origin.x - chrome_inset.x,
            screen.y - origin.y - chrome_inset.y,
        )
    }

    /// Subscribe to the close notification.
    ///
    /// Listeners run once, on the thread that closes the window. Subscribing to
    /// an already closed window runs the listener immediately.
    pub fn on_close(&self, listener: CloseListener) {
        if !self.is_closed() {
            let mut listeners = self.close_listeners.lock();
            // Re-check under the lock; `close` drains while holding it
            if !self.is_closed() {
                listeners.push(listener);
                return;
            }
        }
        if let Some(id) = self.id() {
            listener(id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the window closed and notify listeners. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let listeners = {
            let mut listeners = self.close_listeners.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *listeners)
        };

        match self.id() {
            Some(id) => {
                tracing::info!(%id, "Window closed");
                listeners.into_iter().for_each(|listener| listener(id));
            }
            None => tracing::debug!("Unregistered window closed"),
        }
        true
    }

    /// Close the window and drain its tab operations
    pub async fn dispose(&self) -> bool {
        self.close();
        self.operations.dispose().await
    }
}

// ============================================================================
// Window creation
// ============================================================================

/// What a new window starts with
#[derive(Debug, Clone)]
pub enum InitialTab {
    Path(PathBuf),
    Blank,
    /// A tab taken from another window, history included
    Detached(DetachedTab),
}

/// Parameters for creating a new window
#[derive(Debug, Clone, Default)]
pub struct CreateWindowParams {
    /// Initial tabs, in order (empty = one blank tab)
    pub tabs: Vec<InitialTab>,
    /// Outer frame (None = configured default)
    pub frame: Option<Rect>,
    /// Skip position shifting for overlap avoidance.
    /// Used for detached tabs where the exact cursor-relative position is required.
    pub skip_position_shift: bool,
}

/// Builds, registers and shows windows
pub struct WindowSpawner {
    config: Arc<Config>,
    dispatcher: Arc<UiDispatcher>,
    registry: Arc<WindowLifecycleManager>,
    host: Arc<dyn WindowHost>,
}

impl WindowSpawner {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<UiDispatcher>,
        registry: Arc<WindowLifecycleManager>,
        host: Arc<dyn WindowHost>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            registry,
            host,
        }
    }

    pub fn default_frame(&self) -> Rect {
        let position = self.config.window_position.default_position;
        let size = self.config.window_size.default_size;
        Rect::new(position.x, position.y, size.width, size.height)
    }

    /// Create a window, register it and hand it to the host.
    ///
    /// On failure nothing stays registered or shown. Tabs passed in as
    /// `InitialTab::Detached` are dropped with the window, so callers keep
    /// their own copy for rollback.
    pub fn create_window(&self, params: CreateWindowParams) -> Result<Arc<AppWindow>, WindowError> {
        let base = params.frame.unwrap_or_else(|| self.default_frame());

        let frame = if params.skip_position_shift {
            tracing::debug!(?base, "Position shift skipped (skip_position_shift=true)");
            base
        } else {
            let position_offset = self.config.window_position.position_offset;
            let occupied: Vec<Point> = self
                .registry
                .get_active_windows()
                .iter()
                .map(|window| window.frame().origin())
                .collect();
            let shifted =
                shift_position_if_needed(base, position_offset, self.host.screen_bounds(), &occupied);
            tracing::debug!(?base, ?position_offset, ?shifted, "Shifted position is calculated");
            base.with_origin(shifted)
        };

        let service = self.build_service(params.tabs)?;
        let operations = ThreadSafeTabOperations::new(
            service.into_shared(),
            Arc::clone(&self.dispatcher),
            &self.config.operations,
        );
        let tab_strip = TabStrip::new(
            Rect::new(0.0, 0.0, frame.width, TAB_STRIP_HEIGHT),
            self.config.drag.max_tab_width,
        );
        let window = AppWindow::new(operations, frame, Some(tab_strip));

        let id = self.registry.register_window(&window)?;
        if let Err(e) = self.host.show_window(Arc::clone(&window)) {
            tracing::warn!(%id, %e, "Host failed to show window");
            window.close();
            return Err(e.into());
        }
        self.registry.set_focused_window(id);

        Ok(window)
    }

    fn build_service(&self, tabs: Vec<InitialTab>) -> Result<TabManagerService, TabError> {
        let mut service = TabManagerService::new(TabPolicy::from(&self.config.tabs));
        let tabs = if tabs.is_empty() {
            vec![InitialTab::Blank]
        } else {
            tabs
        };

        for initial in tabs {
            let index = service.count();
            match initial {
                InitialTab::Path(path) => {
                    let title = display_name_for(&path);
                    service.create_tab(title, Some(path), TabOptions::default())?;
                }
                InitialTab::Blank => {
                    service.create_tab("", None, TabOptions::default())?;
                }
                InitialTab::Detached(detached) => {
                    service.insert_tab(detached, index)?;
                }
            }
        }
        Ok(service)
    }
}

fn shift_position_if_needed(
    base: Rect,
    offset: WindowPositionOffset,
    screen: Rect,
    occupied: &[Point],
) -> Point {
    if offset.x == 0 && offset.y == 0 {
        return base.origin();
    }
    let min_x = screen.left();
    let min_y = screen.top();
    let max_x = (screen.right() - base.width).max(min_x);
    let max_y = (screen.bottom() - base.height).max(min_y);
    let mut position = Point::new(base.x.clamp(min_x, max_x), base.y.clamp(min_y, max_y));
    let mut offset_x = f64::from(offset.x);
    let mut offset_y = f64::from(offset.y);
    for attempt in 0..MAX_POSITION_SHIFT_ATTEMPTS {
        // Heuristic: avoid identical/nearby top-left positions rather than full rect overlap.
        let x_half = (offset_x.abs().max(1.0) / 2.0).floor();
        let y_half = (offset_y.abs().max(1.0) / 2.0).floor();
        let x_min = position.x - x_half;
        let x_max = position.x + x_half;
        let y_min = position.y - y_half;
        let y_max = position.y + y_half;
        if !occupied.iter().any(|existing| {
            existing.x >= x_min && existing.x <= x_max && existing.y >= y_min && existing.y <= y_max
        }) {
            break;
        }
        let mut next_x = position.x + offset_x;
        let mut next_y = position.y + offset_y;
        if next_x < min_x || next_x > max_x {
            offset_x = -offset_x;
            next_x = position.x + offset_x;
        }
        if next_y < min_y || next_y > max_y {
            offset_y = -offset_y;
            next_y = position.y + offset_y;
        }
        position = Point::new(next_x.clamp(min_x, max_x), next_y.clamp(min_y, max_y));

        // Log warning if we've reached the limit
        if attempt == MAX_POSITION_SHIFT_ATTEMPTS - 1 {
            tracing::warn!(
                "Window position shift reached maximum attempts ({}), windows may overlap",
                MAX_POSITION_SHIFT_ATTEMPTS
            );
        }
    }
    position
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::OperationConfig;
    use crate::window::host::HeadlessHost;

    /// Unregistered window with one tab per name (paths are `/<name>`)
    pub(crate) fn test_window(names: &[&str]) -> Arc<AppWindow> {
        let mut service = TabManagerService::default();
        for name in names {
            service
                .create_tab(*name, Some(PathBuf::from(format!("/{name}"))), TabOptions::default())
                .unwrap();
        }
        let operations = ThreadSafeTabOperations::new(
            service.into_shared(),
            Arc::new(UiDispatcher::new().unwrap()),
            &OperationConfig::default(),
        );
        AppWindow::new(
            operations,
            Rect::new(100.0, 100.0, 800.0, 600.0),
            Some(TabStrip::new(Rect::new(0.0, 0.0, 800.0, TAB_STRIP_HEIGHT), 240.0)),
        )
    }

    fn spawner() -> (WindowSpawner, Arc<WindowLifecycleManager>, Arc<HeadlessHost>) {
        let registry = Arc::new(WindowLifecycleManager::new());
        let host = HeadlessHost::new(Rect::new(0.0, 0.0, 1920.0, 1080.0));
        let spawner = WindowSpawner::new(
            Arc::new(Config::default()),
            Arc::new(UiDispatcher::new().unwrap()),
            Arc::clone(&registry),
            host.clone(),
        );
        (spawner, registry, host)
    }

    fn titles(window: &AppWindow) -> Vec<String> {
        window
            .tabs()
            .lock()
            .tabs()
            .iter()
            .map(|tab| tab.title.clone())
            .collect()
    }

    // === AppWindow ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_runs_listeners_once() {
        let window = test_window(&["a"]);
        assert!(window.assign_id(WindowId::from_parts(0, 1)));
        let calls = Arc::new(Mutex::new(Vec::new()));
        {
            let calls = Arc::clone(&calls);
            window.on_close(Box::new(move |id| calls.lock().push(id)));
        }

        assert!(window.close());
        assert!(!window.close());
        assert_eq!(*calls.lock(), [WindowId::from_parts(0, 1)]);

        // Late subscribers are notified immediately
        let late = Arc::new(AtomicBool::new(false));
        {
            let late = Arc::clone(&late);
            window.on_close(Box::new(move |_| late.store(true, Ordering::SeqCst)));
        }
        assert!(late.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_assign_id_only_once() {
        let window = test_window(&["a"]);
        assert!(window.assign_id(WindowId::from_parts(0, 1)));
        assert!(!window.assign_id(WindowId::from_parts(1, 1)));
        assert_eq!(window.id(), Some(WindowId::from_parts(0, 1)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_screen_to_client() {
        let window = test_window(&["a"]);
        let client = window.screen_to_client(Point::new(150.0, 140.0), Point::new(0.0, 28.0));
        assert_eq!(client, Point::new(50.0, 12.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispose_closes_and_drains() {
        let window = test_window(&["a"]);
        assert!(window.dispose().await);
        assert!(window.is_closed());
        assert!(window.operations().is_disposed());
    }

    // === WindowSpawner ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_window_registers_and_shows() {
        let (spawner, registry, host) = spawner();

        let window = spawner
            .create_window(CreateWindowParams {
                tabs: vec![
                    InitialTab::Path(PathBuf::from("/home/docs")),
                    InitialTab::Path(PathBuf::from("/tmp")),
                ],
                ..Default::default()
            })
            .unwrap();

        let id = window.id().unwrap();
        assert_eq!(titles(&window), ["docs", "tmp"]);
        assert_eq!(registry.active_window_count(), 1);
        assert_eq!(host.window_ids(), [id]);
        assert_eq!(registry.last_focused_window(), Some(id));
        assert_eq!(window.frame(), spawner.default_frame());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_window_without_tabs_gets_blank_tab() {
        let (spawner, _, _) = spawner();
        let window = spawner.create_window(CreateWindowParams::default()).unwrap();
        assert_eq!(titles(&window), ["New Tab"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_window_is_staggered() {
        let (spawner, _, _) = spawner();
        let first = spawner.create_window(CreateWindowParams::default()).unwrap();
        let second = spawner.create_window(CreateWindowParams::default()).unwrap();

        let a = first.frame().origin();
        let b = second.frame().origin();
        assert_eq!(b, Point::new(a.x + 20.0, a.y + 20.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_skip_position_shift_keeps_exact_frame() {
        let (spawner, _, _) = spawner();
        let _first = spawner.create_window(CreateWindowParams::default()).unwrap();
        let frame = spawner.default_frame();

        let second = spawner
            .create_window(CreateWindowParams {
                frame: Some(frame),
                skip_position_shift: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(second.frame(), frame);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_window_host_failure_leaves_nothing_registered() {
        let (spawner, registry, host) = spawner();
        host.refuse_next_show();

        let result = spawner.create_window(CreateWindowParams::default());

        assert!(matches!(result, Err(WindowError::Host(HostError::Refused(_)))));
        assert_eq!(registry.active_window_count(), 0);
        assert!(host.window_ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_window_with_detached_tab() {
        let (spawner, _, _) = spawner();
        let mut source = TabManagerService::default();
        source
            .create_tab("a", Some(PathBuf::from("/a")), TabOptions::default())
            .unwrap();
        let moving = source
            .create_tab("b", Some(PathBuf::from("/b")), TabOptions::default())
            .unwrap();
        let detached = source.take_tab(moving.id).unwrap();

        let window = spawner
            .create_window(CreateWindowParams {
                tabs: vec![InitialTab::Detached(detached)],
                ..Default::default()
            })
            .unwrap();

        let tabs = window.tabs().lock();
        assert_eq!(tabs.count(), 1);
        assert_eq!(tabs.active_tab().unwrap().id, moving.id);
    }

    // === Position shifting ===

    #[test]
    fn test_shift_position_if_needed_no_offset() {
        let base = Rect::new(10.0, 10.0, 100.0, 100.0);
        let result = shift_position_if_needed(
            base,
            WindowPositionOffset { x: 0, y: 0 },
            Rect::new(0.0, 0.0, 500.0, 500.0),
            &[],
        );
        assert_eq!(result, base.origin());
    }

    #[test]
    fn test_shift_position_if_needed_shifts_when_occupied() {
        let base = Rect::new(0.0, 0.0, 50.0, 50.0);
        let result = shift_position_if_needed(
            base,
            WindowPositionOffset { x: 20, y: 20 },
            Rect::new(0.0, 0.0, 200.0, 200.0),
            &[base.origin()],
        );
        assert_eq!(result, Point::new(20.0, 20.0));
    }

    #[test]
    fn test_shift_position_if_needed_bounces_on_bounds() {
        let base = Rect::new(50.0, 50.0, 50.0, 50.0);
        let result = shift_position_if_needed(
            base,
            WindowPositionOffset { x: 20, y: 20 },
            Rect::new(0.0, 0.0, 100.0, 100.0),
            &[base.origin()],
        );
        assert_eq!(result, Point::new(30.0, 30.0));
    }

    #[test]
    fn test_shift_position_if_needed_with_oversized_window() {
        let base = Rect::new(10.0, 10.0, 500.0, 500.0);
        let result = shift_position_if_needed(
            base,
            WindowPositionOffset { x: 20, y: 20 },
            Rect::new(0.0, 0.0, 100.0, 100.0),
            &[base.origin()],
        );
        assert_eq!(result, Point::ZERO);
    }

    #[test]
    fn test_shift_position_if_needed_with_negative_origin() {
        let base = Rect::new(-240.0, 20.0, 100.0, 100.0);
        let result = shift_position_if_needed(
            base,
            WindowPositionOffset { x: 20, y: 20 },
            Rect::new(-300.0, -200.0, 200.0, 200.0),
            &[base.origin()],
        );
        assert_eq!(result, Point::new(-240.0, -100.0));
    }
}
