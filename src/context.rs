//! Process-wide context, built once at startup and passed by reference.
//!
//! Owns the UI dispatcher, the window registry, the host, the drag service
//! and the settings store. Tests build a fresh context each time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, StartupBehavior};
use crate::drag::{DragError, TabDragDropService};
use crate::settings::{Settings, LAST_WINDOW_FRAME_KEY};
use crate::state::TabId;
use crate::tabs::{LegacyTabItem, TabManager, TabOperationsManager, UnifiedTabService};
use crate::ui_thread::{DispatchError, UiDispatcher};
use crate::utils::{FileOperationError, FileOperations, LocalFileOperations};
use crate::window::host::WindowHost;
use crate::window::main::{AppWindow, CreateWindowParams, InitialTab, WindowError, WindowSpawner};
use crate::window::registry::{WindowId, WindowLifecycleManager};
use crate::window::Rect;

#[derive(Debug, Error)]
pub enum DropError {
    #[error("Window {0} is gone")]
    WindowGone(WindowId),
    #[error("Tab {0} not found")]
    TabNotFound(TabId),
    #[error("Tab {0} has no directory to drop into")]
    NoDirectory(TabId),
    #[error("Copy task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One window in a session snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub id: WindowId,
    pub frame: Rect,
    pub tabs: Vec<LegacyTabItem>,
}

/// Live windows and their tabs, in registry order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub focused_window: Option<WindowId>,
    pub windows: Vec<WindowSnapshot>,
}

pub struct AppContext {
    config: Arc<Config>,
    dispatcher: Arc<UiDispatcher>,
    registry: Arc<WindowLifecycleManager>,
    host: Arc<dyn WindowHost>,
    spawner: Arc<WindowSpawner>,
    operations: TabOperationsManager,
    drag: TabDragDropService,
    settings: Settings,
    file_ops: Arc<dyn FileOperations>,
    is_first_window: AtomicBool,
}

impl AppContext {
    pub fn new(config: Config, host: Arc<dyn WindowHost>, settings: Settings) -> Result<Self, DispatchError> {
        let config = Arc::new(config);
        let dispatcher = Arc::new(UiDispatcher::new()?);
        let registry = Arc::new(WindowLifecycleManager::new());
        let spawner = Arc::new(WindowSpawner::new(
            Arc::clone(&config),
            Arc::clone(&dispatcher),
            Arc::clone(&registry),
            Arc::clone(&host),
        ));
        let drag = TabDragDropService::new(
            config.drag.clone(),
            Arc::clone(&registry),
            Arc::clone(&host),
            Arc::clone(&spawner),
        );

        Ok(Self {
            operations: TabOperationsManager::new(Arc::clone(&host)),
            config,
            dispatcher,
            registry,
            host,
            spawner,
            drag,
            settings,
            file_ops: Arc::new(LocalFileOperations),
            is_first_window: AtomicBool::new(true),
        })
    }

    pub fn with_file_operations(mut self, file_ops: Arc<dyn FileOperations>) -> Self {
        self.file_ops = file_ops;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WindowLifecycleManager> {
        &self.registry
    }

    pub fn host(&self) -> &Arc<dyn WindowHost> {
        &self.host
    }

    pub fn drag(&self) -> &TabDragDropService {
        &self.drag
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ========================================================================
    // Windows
    // ========================================================================

    /// Open a window with one tab per path (a blank tab if `paths` is empty)
    pub fn open_window(&self, paths: Vec<PathBuf>) -> Result<Arc<AppWindow>, WindowError> {
        let is_first_window = self.is_first_window.swap(false, Ordering::AcqRel);
        let (frame, restored) = self.resolve_frame(is_first_window);

        let window = self.spawner.create_window(CreateWindowParams {
            tabs: paths.into_iter().map(InitialTab::Path).collect(),
            frame: Some(frame),
            skip_position_shift: restored,
        })?;
        tracing::info!(id = ?window.id(), tabs = window.tab_count(), is_first_window, "Window opened");
        Ok(window)
    }

    /// Close a window and drain its pending tab operations
    pub async fn close_window(&self, id: WindowId) -> bool {
        let Some(window) = self.registry.find_window(id) else {
            return false;
        };
        if self
            .drag
            .current_drag()
            .is_some_and(|drag| drag.source_window == id)
        {
            self.drag.cancel_drag().await;
        }

        // Releases the host's handle; the close listener unregisters the window
        self.host.close_window(id);
        window.dispose().await
    }

    pub fn focus_window(&self, id: WindowId) -> bool {
        if !self.host.focus_window(id) {
            return false;
        }
        self.registry.set_focused_window(id);
        true
    }

    // ========================================================================
    // Tab commands without a drag
    // ========================================================================

    /// "Move to Window": append `tab` to `target`
    pub async fn move_tab_to_window(
        &self,
        source: WindowId,
        tab: TabId,
        target: WindowId,
    ) -> Result<usize, DragError> {
        let source = self.window(source)?;
        let target_window = self.window(target)?;
        let index = self
            .operations
            .transfer_tab(
                &source,
                &target_window,
                tab,
                target_window.tab_count(),
                &CancellationToken::new(),
            )
            .await?;
        self.focus_window(target);
        Ok(index)
    }

    /// "Open in New Window": detach `tab` into a staggered default-size window
    pub async fn open_tab_in_new_window(&self, source: WindowId, tab: TabId) -> Result<Arc<AppWindow>, DragError> {
        let source = self.window(source)?;
        let window = self
            .operations
            .detach_tab(&source, tab, None, &self.spawner, &CancellationToken::new())
            .await?;
        if let Some(id) = window.id() {
            self.focus_window(id);
        }
        Ok(window)
    }

    /// Copy dropped files into the directory shown by `tab`. Returns the new paths.
    ///
    /// Items that fail to copy are logged and skipped.
    pub async fn drop_paths_on_tab(
        &self,
        window: WindowId,
        tab: TabId,
        paths: Vec<PathBuf>,
    ) -> Result<Vec<PathBuf>, DropError> {
        let target_dir = {
            let window = self
                .registry
                .find_window(window)
                .ok_or(DropError::WindowGone(window))?;
            let manager = window.tabs().lock();
            let tab_path = manager
                .tab(tab)
                .ok_or(DropError::TabNotFound(tab))?
                .path
                .clone();
            tab_path.and_then(|path| directory_of(&path)).ok_or(DropError::NoDirectory(tab))?
        };

        let file_ops = Arc::clone(&self.file_ops);
        let copied = tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .filter_map(|source| match file_ops.copy_item(source, &target_dir) {
                    Ok(copied) => Some(copied),
                    Err(e) => {
                        log_copy_failure(source, &e);
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await?;

        tracing::info!(%tab, count = copied.len(), "Dropped items copied");
        Ok(copied)
    }

    // ========================================================================
    // Session
    // ========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        let windows = self
            .registry
            .get_active_windows()
            .into_iter()
            .filter_map(|window| {
                Some(WindowSnapshot {
                    id: window.id()?,
                    frame: window.frame(),
                    tabs: UnifiedTabService::new(window.operations().clone()).items(),
                })
            })
            .collect();
        SessionSnapshot {
            focused_window: self.registry.last_focused_window(),
            windows,
        }
    }

    /// Save the focused window's frame, close every window and stop the UI thread
    pub async fn shutdown(&self) {
        self.drag.cancel_drag().await;

        let focused = self
            .registry
            .last_focused_window()
            .and_then(|id| self.registry.find_window(id));
        if let Some(window) = focused {
            self.settings.update_setting(LAST_WINDOW_FRAME_KEY, window.frame());
            self.settings.save_settings();
        }

        // Closing a window also releases the host's handle to it
        self.registry.force_close_all_windows().await;

        // Joins the UI thread
        let dispatcher = Arc::clone(&self.dispatcher);
        if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await {
            tracing::error!(%e, "Failed to stop the UI thread");
        }
        tracing::info!("Shutdown complete");
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn window(&self, id: WindowId) -> Result<Arc<AppWindow>, DragError> {
        self.registry.find_window(id).ok_or(DragError::WindowGone(id))
    }

    /// Frame for a new window, and whether it was restored from the last session
    fn resolve_frame(&self, is_first_window: bool) -> (Rect, bool) {
        let default = self.spawner.default_frame();
        let last = is_first_window
            .then(|| self.settings.get_setting::<Option<Rect>>(LAST_WINDOW_FRAME_KEY, None))
            .flatten();
        let Some(last) = last else {
            return (default, false);
        };

        let position = choose_by_behavior(
            self.config.window_position.on_startup,
            || (default.x, default.y),
            || (last.x, last.y),
        );
        let size = choose_by_behavior(
            self.config.window_size.on_startup,
            || (default.width, default.height),
            || (last.width, last.height),
        );
        let restored = self.config.window_position.on_startup == StartupBehavior::LastClosed;
        (Rect::new(position.0, position.1, size.0, size.1), restored)
    }
}

fn choose_by_behavior<T>(on_startup: StartupBehavior, default: impl FnOnce() -> T, last: impl FnOnce() -> T) -> T {
    match on_startup {
        StartupBehavior::Default => default(),
        StartupBehavior::LastClosed => last(),
    }
}

/// The directory a tab shows: the path itself, or the parent of a file
fn directory_of(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        Some(path.to_path_buf())
    } else {
        path.parent().filter(|parent| parent.is_dir()).map(Path::to_path_buf)
    }
}

fn log_copy_failure(source: &Path, e: &FileOperationError) {
    tracing::warn!(source = %source.display(), %e, "Failed to copy dropped item");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::host::HeadlessHost;
    use crate::window::Point;
    use tempfile::TempDir;

    struct Fixture {
        context: AppContext,
        host: Arc<HeadlessHost>,
        dir: TempDir,
    }

    fn fixture_with(config: Config) -> Fixture {
        let dir = TempDir::new().unwrap();
        fixture_in(config, dir)
    }

    fn fixture_in(config: Config, dir: TempDir) -> Fixture {
        let host = HeadlessHost::with_chrome_inset(Rect::new(0.0, 0.0, 1920.0, 1080.0), Point::ZERO);
        let settings = Settings::load(dir.path().join("settings.json"));
        let context = AppContext::new(config, host.clone(), settings).unwrap();
        Fixture { context, host, dir }
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default())
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|name| PathBuf::from(format!("/{name}"))).collect()
    }

    fn tab_id(window: &AppWindow, index: usize) -> TabId {
        window.tabs().lock().tabs()[index].id
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

    // === Windows ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_window_with_paths() {
        let fixture = fixture();
        let window = fixture.context.open_window(paths(&["docs", "src"])).unwrap();

        assert_eq!(titles(&window), ["docs", "src"]);
        assert_eq!(fixture.context.registry().active_window_count(), 1);
        assert_eq!(fixture.host.window_ids(), vec![window.id().unwrap()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_window_without_paths_has_blank_tab() {
        let fixture = fixture();
        let window = fixture.context.open_window(Vec::new()).unwrap();
        assert_eq!(titles(&window), ["New Tab"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_window_is_staggered() {
        let fixture = fixture();
        let first = fixture.context.open_window(paths(&["a"])).unwrap();
        let second = fixture.context.open_window(paths(&["b"])).unwrap();

        assert_eq!(first.frame().origin(), Point::new(100.0, 100.0));
        assert_eq!(second.frame().origin(), Point::new(120.0, 120.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_window_unregisters() {
        let fixture = fixture();
        let window = fixture.context.open_window(paths(&["a"])).unwrap();
        let id = window.id().unwrap();

        assert!(fixture.context.close_window(id).await);
        assert!(window.is_closed());
        assert!(fixture.host.window_ids().is_empty());
        drop(window);
        assert_eq!(fixture.context.registry().active_window_count(), 0);
        assert!(!fixture.context.close_window(id).await);
    }

    // === Tab commands ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_tab_to_window_appends() {
        let fixture = fixture();
        let source = fixture.context.open_window(paths(&["a", "b"])).unwrap();
        let target = fixture.context.open_window(paths(&["x"])).unwrap();
        let b = tab_id(&source, 1);

        let index = fixture
            .context
            .move_tab_to_window(source.id().unwrap(), b, target.id().unwrap())
            .await
            .unwrap();

        assert_eq!(index, 1);
        assert_eq!(titles(&source), ["a"]);
        assert_eq!(titles(&target), ["x", "b"]);
        assert_eq!(fixture.context.registry().last_focused_window(), target.id());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_move_last_tab_refused() {
        let fixture = fixture();
        let source = fixture.context.open_window(paths(&["a"])).unwrap();
        let target = fixture.context.open_window(paths(&["x"])).unwrap();

        let result = fixture
            .context
            .move_tab_to_window(source.id().unwrap(), tab_id(&source, 0), target.id().unwrap())
            .await;

        assert!(matches!(result, Err(DragError::LastTab)));
        assert_eq!(titles(&source), ["a"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_tab_in_new_window() {
        let fixture = fixture();
        let source = fixture.context.open_window(paths(&["a", "b"])).unwrap();
        let a = tab_id(&source, 0);

        let window = fixture
            .context
            .open_tab_in_new_window(source.id().unwrap(), a)
            .await
            .unwrap();

        assert_eq!(titles(&source), ["b"]);
        assert_eq!(titles(&window), ["a"]);
        assert_ne!(window.frame().origin(), source.frame().origin());
        assert_eq!(fixture.host.focused_window(), window.id());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_paths_on_tab_copies_into_directory() {
        let fixture = fixture();
        let target_dir = fixture.dir.path().join("target");
        std::fs::create_dir(&target_dir).unwrap();
        let dropped = fixture.dir.path().join("notes.txt");
        std::fs::write(&dropped, "hello").unwrap();

        let window = fixture.context.open_window(vec![target_dir.clone()]).unwrap();
        let tab = tab_id(&window, 0);

        let copied = fixture
            .context
            .drop_paths_on_tab(
                window.id().unwrap(),
                tab,
                vec![dropped.clone(), fixture.dir.path().join("missing.txt")],
            )
            .await
            .unwrap();

        assert_eq!(copied, vec![target_dir.join("notes.txt")]);
        assert!(dropped.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_on_blank_tab_has_no_directory() {
        let fixture = fixture();
        let window = fixture.context.open_window(Vec::new()).unwrap();
        let tab = tab_id(&window, 0);

        let result = fixture
            .context
            .drop_paths_on_tab(window.id().unwrap(), tab, Vec::new())
            .await;
        assert!(matches!(result, Err(DropError::NoDirectory(_))));
    }

    // === Session ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_lists_windows_and_tabs() {
        let fixture = fixture();
        fixture.context.open_window(paths(&["a", "b"])).unwrap();
        let second = fixture.context.open_window(paths(&["c"])).unwrap();

        let snapshot = fixture.context.snapshot();
        assert_eq!(snapshot.windows.len(), 2);
        assert_eq!(snapshot.windows[0].tabs.len(), 2);
        assert_eq!(snapshot.focused_window, second.id());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["focusedWindow"].is_object());
        assert_eq!(json["windows"][1]["tabs"][0]["title"], "c");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_saves_frame_and_closes_windows() {
        let fixture = fixture();
        let window = fixture.context.open_window(paths(&["a"])).unwrap();
        window.set_frame(Rect::new(300.0, 200.0, 640.0, 480.0));

        fixture.context.shutdown().await;

        assert!(window.is_closed());
        assert!(fixture.host.window_ids().is_empty());
        let saved = Settings::load(fixture.dir.path().join("settings.json"));
        assert_eq!(
            saved.get_setting::<Option<Rect>>(LAST_WINDOW_FRAME_KEY, None),
            Some(Rect::new(300.0, 200.0, 640.0, 480.0))
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_ui_thread_on_current_thread_runtime() {
        let fixture = fixture();
        fixture.context.open_window(paths(&["a", "b"])).unwrap();

        fixture.context.shutdown().await;

        let result = fixture.context.dispatcher.run(|| ()).await;
        assert!(matches!(result, Err(DispatchError::Closed)));
        assert_eq!(fixture.context.registry().active_window_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_window_restores_last_frame() {
        let dir = TempDir::new().unwrap();
        let frame = Rect::new(300.0, 200.0, 640.0, 480.0);
        {
            let settings = Settings::load(dir.path().join("settings.json"));
            settings.update_setting(LAST_WINDOW_FRAME_KEY, frame);
            assert!(settings.save_settings());
        }

        let mut config = Config::default();
        config.window_position.on_startup = StartupBehavior::LastClosed;
        config.window_size.on_startup = StartupBehavior::LastClosed;
        let fixture = fixture_in(config, dir);

        let first = fixture.context.open_window(paths(&["a"])).unwrap();
        let second = fixture.context.open_window(paths(&["b"])).unwrap();

        assert_eq!(first.frame(), frame);
        assert_eq!(second.frame().width, 1000.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_frame_ignored_by_default() {
        let dir = TempDir::new().unwrap();
        {
            let settings = Settings::load(dir.path().join("settings.json"));
            settings.update_setting(LAST_WINDOW_FRAME_KEY, Rect::new(300.0, 200.0, 640.0, 480.0));
            assert!(settings.save_settings());
        }
        let fixture = fixture_in(Config::default(), dir);

        let window = fixture.context.open_window(paths(&["a"])).unwrap();
        assert_eq!(window.frame(), Rect::new(100.0, 100.0, 1000.0, 800.0));
    }
}
