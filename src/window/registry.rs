//! Process-wide registry of live windows.
//!
//! Windows are tracked through generational slots holding a `Weak`, so the
//! registry never keeps a window alive. Dead entries are purged lazily when
//! the registry is enumerated or on `cleanup_disposed_windows`.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::{window_event_channel, WindowEvent};

use super::main::AppWindow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Window slot {0} is already occupied")]
    IdCollision(WindowId),
    #[error("Window {0} is already registered")]
    AlreadyRegistered(WindowId),
}

/// Generational window handle
///
/// A slot is reused after its window goes away, but with a new generation, so
/// a stale id never resolves to a different window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId {
    slot: u32,
    generation: u32,
}

impl WindowId {
    pub const fn from_parts(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}v{}", self.slot, self.generation)
    }
}

struct Slot {
    generation: u32,
    window: Option<Weak<AppWindow>>,
}

impl Slot {
    fn live(&self) -> Option<Arc<AppWindow>> {
        self.window.as_ref().and_then(Weak::upgrade)
    }
}

#[derive(Default)]
struct RegistryState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    last_focused: Option<WindowId>,
}

impl RegistryState {
    fn allocate(&mut self, window: Weak<AppWindow>) -> Result<WindowId, RegistryError> {
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            let id = WindowId::from_parts(slot, entry.generation.wrapping_add(1));
            if entry.window.is_some() {
                return Err(RegistryError::IdCollision(id));
            }
            entry.generation = id.generation;
            entry.window = Some(window);
            return Ok(id);
        }

        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            window: Some(window),
        });
        Ok(WindowId::from_parts(slot, 1))
    }

    fn slot(&self, id: WindowId) -> Option<&Slot> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Vacate a slot; returns the window if it was still alive
    fn release(&mut self, id: WindowId) -> Option<Option<Arc<AppWindow>>> {
        let slot = self
            .slots
            .get_mut(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let window = slot.window.take()?;
        self.free.push(id.slot);
        if self.last_focused == Some(id) {
            self.last_focused = None;
        }
        Some(window.upgrade())
    }

    fn purge(&mut self) -> Vec<WindowId> {
        let dead: Vec<WindowId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.window.is_some() && slot.live().is_none())
            .map(|(index, slot)| WindowId::from_parts(index as u32, slot.generation))
            .collect();
        for id in &dead {
            self.release(*id);
        }
        dead
    }
}

/// Tracks every live window without owning it
pub struct WindowLifecycleManager {
    state: RwLock<RegistryState>,
    events: broadcast::Sender<WindowEvent>,
}

impl Default for WindowLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowLifecycleManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            events: window_event_channel(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowEvent> {
        self.events.subscribe()
    }

    /// Register a window and unregister it automatically when it closes.
    pub fn register_window(self: &Arc<Self>, window: &Arc<AppWindow>) -> Result<WindowId, RegistryError> {
        if let Some(existing) = window.id() {
            return Err(RegistryError::AlreadyRegistered(existing));
        }

        let id = self.state.write().allocate(Arc::downgrade(window))?;

        if !window.assign_id(id) {
            // Lost a race with a concurrent registration of the same window
            self.state.write().release(id);
            let existing = window.id().unwrap_or(id);
            return Err(RegistryError::AlreadyRegistered(existing));
        }

        let registry = Arc::downgrade(self);
        window.on_close(Box::new(move |id| {
            if let Some(registry) = registry.upgrade() {
                registry.unregister_window_by_id(id);
            }
        }));

        tracing::info!(%id, "Window registered");
        let _ = self.events.send(WindowEvent::Registered(id));
        Ok(id)
    }

    pub fn unregister_window(&self, window: &AppWindow) -> bool {
        window
            .id()
            .is_some_and(|id| self.unregister_window_by_id(id))
    }

    /// Remove the entry for `id`. Returns whether a live window was removed.
    pub fn unregister_window_by_id(&self, id: WindowId) -> bool {
        let released = self.state.write().release(id);
        match released {
            Some(window) => {
                tracing::info!(%id, "Window unregistered");
                let _ = self.events.send(WindowEvent::Unregistered(id));
                window.is_some()
            }
            None => false,
        }
    }

    pub fn find_window(&self, id: WindowId) -> Option<Arc<AppWindow>> {
        self.state.read().slot(id).and_then(Slot::live)
    }

    /// All live windows in slot order; dead entries are purged
    pub fn get_active_windows(&self) -> Vec<Arc<AppWindow>> {
        let mut state = self.state.write();
        let purged = state.purge();
        let windows = state.slots.iter().filter_map(Slot::live).collect();
        drop(state);

        self.announce_purged(&purged);
        windows
    }

    pub fn active_window_count(&self) -> usize {
        self.state
            .read()
            .slots
            .iter()
            .filter(|slot| slot.live().is_some())
            .count()
    }

    /// Drop entries whose window has been deallocated. Returns how many were removed.
    pub fn cleanup_disposed_windows(&self) -> usize {
        let purged = self.state.write().purge();
        self.announce_purged(&purged);
        purged.len()
    }

    pub fn set_focused_window(&self, id: WindowId) {
        {
            let mut state = self.state.write();
            if state.slot(id).and_then(Slot::live).is_none() {
                return;
            }
            state.last_focused = Some(id);
        }
        tracing::trace!(%id, "Window focused");
        let _ = self.events.send(WindowEvent::Focused(id));
    }

    /// The last focused window, if it is still alive
    pub fn last_focused_window(&self) -> Option<WindowId> {
        let state = self.state.read();
        state
            .last_focused
            .filter(|id| state.slot(*id).and_then(Slot::live).is_some())
    }

    /// Close and dispose every window, then clear the registry.
    pub async fn force_close_all_windows(&self) {
        let windows = self.get_active_windows();
        tracing::info!(count = windows.len(), "Force closing all windows");

        for window in windows {
            let id = window.id();
            if !window.dispose().await {
                tracing::warn!(?id, "Window did not drain its pending tab operations in time");
            }
        }

        let remaining: Vec<WindowId> = {
            let mut state = self.state.write();
            let ids = state
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.window.is_some())
                .map(|(index, slot)| WindowId::from_parts(index as u32, slot.generation))
                .collect();
            for slot in &mut state.slots {
                slot.window = None;
            }
            state.free = (0..state.slots.len() as u32).rev().collect();
            state.last_focused = None;
            ids
        };
        self.announce_purged(&remaining);
    }

    fn announce_purged(&self, ids: &[WindowId]) {
        for id in ids {
            tracing::debug!(%id, "Purged window entry");
            let _ = self.events.send(WindowEvent::Unregistered(*id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::main::tests::test_window;

    // === Registration ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_assigns_distinct_ids() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let a = test_window(&["a"]);
        let b = test_window(&["b"]);

        let id_a = registry.register_window(&a).unwrap();
        let id_b = registry.register_window(&b).unwrap();

        assert_ne!(id_a, id_b);
        assert_eq!(a.id(), Some(id_a));
        assert_eq!(registry.active_window_count(), 2);
        assert!(Arc::ptr_eq(&registry.find_window(id_b).unwrap(), &b));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_twice_is_error() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);

        let id = registry.register_window(&window).unwrap();
        assert_eq!(
            registry.register_window(&window),
            Err(RegistryError::AlreadyRegistered(id))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_emits_event() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let mut events = registry.subscribe();
        let window = test_window(&["a"]);

        let id = registry.register_window(&window).unwrap();
        assert_eq!(events.try_recv().unwrap(), WindowEvent::Registered(id));
    }

    // === Weak tracking ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_window_is_purged() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let keep = test_window(&["keep"]);
        let gone = test_window(&["gone"]);
        registry.register_window(&keep).unwrap();
        let gone_id = registry.register_window(&gone).unwrap();

        drop(gone);

        assert_eq!(registry.active_window_count(), 1);
        assert!(registry.find_window(gone_id).is_none());
        let active = registry.get_active_windows();
        assert_eq!(active.len(), 1);
        assert!(Arc::ptr_eq(&active[0], &keep));
        // Already purged by enumeration
        assert_eq!(registry.cleanup_disposed_windows(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cleanup_disposed_windows_counts_purged() {
        let registry = Arc::new(WindowLifecycleManager::new());
        for name in ["a", "b", "c"] {
            let window = test_window(&[name]);
            registry.register_window(&window).unwrap();
        }

        assert_eq!(registry.cleanup_disposed_windows(), 3);
        assert_eq!(registry.active_window_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reused_slot_gets_new_generation() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let first = test_window(&["a"]);
        let first_id = registry.register_window(&first).unwrap();
        drop(first);
        registry.cleanup_disposed_windows();

        let second = test_window(&["b"]);
        let second_id = registry.register_window(&second).unwrap();

        assert_eq!(second_id.slot(), first_id.slot());
        assert_ne!(second_id.generation(), first_id.generation());
        assert!(registry.find_window(first_id).is_none());
    }

    // === Unregistration ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_unregisters_window() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        let id = registry.register_window(&window).unwrap();

        assert!(window.close());

        assert!(registry.find_window(id).is_none());
        assert_eq!(registry.active_window_count(), 0);
        assert!(!registry.unregister_window_by_id(id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unregister_is_idempotent() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        registry.register_window(&window).unwrap();

        assert!(registry.unregister_window(&window));
        assert!(!registry.unregister_window(&window));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registry_drop_does_not_break_window_close() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        registry.register_window(&window).unwrap();
        drop(registry);

        assert!(window.close());
    }

    // === Focus ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_focused_window_cleared_on_unregister() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let window = test_window(&["a"]);
        let id = registry.register_window(&window).unwrap();

        registry.set_focused_window(id);
        assert_eq!(registry.last_focused_window(), Some(id));

        registry.unregister_window_by_id(id);
        assert_eq!(registry.last_focused_window(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_focus_unknown_window_is_ignored() {
        let registry = WindowLifecycleManager::new();
        registry.set_focused_window(WindowId::from_parts(9, 9));
        assert_eq!(registry.last_focused_window(), None);
    }

    // === Shutdown ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_force_close_all_windows_clears_registry() {
        let registry = Arc::new(WindowLifecycleManager::new());
        let a = test_window(&["a"]);
        let b = test_window(&["b"]);
        registry.register_window(&a).unwrap();
        registry.register_window(&b).unwrap();

        registry.force_close_all_windows().await;

        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(registry.active_window_count(), 0);
        assert!(registry.get_active_windows().is_empty());
    }

    #[test]
    fn test_window_id_display() {
        assert_eq!(WindowId::from_parts(3, 2).to_string(), "window-3v2");
    }
}
