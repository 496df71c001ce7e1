//! Per-window tab collection.
//!
//! `TabManagerService` owns the ordered tabs of one window together with
//! their navigation histories. All methods are synchronous and take
//! `&mut self`; serialisation across tasks is the job of
//! [`ThreadSafeTabOperations`](super::ThreadSafeTabOperations).
//!
//! Collection and history always change in the same call, so a history key
//! never points at the wrong tab.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{TabConfig, DEFAULT_NEW_TAB_TITLE};
use crate::events::{tab_event_channel, TabChange, TabEvent};
use crate::history::{HistoryManager, TabHistoryManager};
use crate::state::{TabColor, TabId, TabModel, TabOptions};
use crate::window::registry::WindowId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TabError {
    #[error("Tab {0} not found")]
    NotFound(TabId),
    #[error("Tab {0} is already in this window")]
    DuplicateId(TabId),
    #[error("Tab limit of {0} reached")]
    LimitReached(usize),
    #[error("No tab at index {0}")]
    NoTabAt(usize),
}

/// Collection rules for one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabPolicy {
    pub max_tabs: Option<usize>,
    pub allow_close_last_tab: bool,
    pub new_tab_title: String,
}

impl Default for TabPolicy {
    fn default() -> Self {
        Self {
            max_tabs: None,
            allow_close_last_tab: false,
            new_tab_title: DEFAULT_NEW_TAB_TITLE.to_string(),
        }
    }
}

impl From<&TabConfig> for TabPolicy {
    fn from(config: &TabConfig) -> Self {
        Self {
            max_tabs: config.max_tabs,
            allow_close_last_tab: config.allow_close_last_tab,
            new_tab_title: config.new_tab_title.clone(),
        }
    }
}

/// A tab removed from its collection, carrying its history along
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedTab {
    pub tab: TabModel,
    pub history: HistoryManager,
}

impl DetachedTab {
    pub fn id(&self) -> TabId {
        self.tab.id
    }
}

/// Read access shared by every tab collection implementation
pub trait TabManager {
    fn tabs(&self) -> &[TabModel];

    fn tab(&self, id: TabId) -> Option<&TabModel> {
        self.tabs().iter().find(|tab| tab.id == id)
    }

    fn index_of(&self, id: TabId) -> Option<usize> {
        self.tabs().iter().position(|tab| tab.id == id)
    }

    fn active_index(&self) -> Option<usize> {
        self.tabs().iter().position(|tab| tab.is_active)
    }

    fn active_tab(&self) -> Option<&TabModel> {
        self.tabs().iter().find(|tab| tab.is_active)
    }

    fn count(&self) -> usize {
        self.tabs().len()
    }

    fn subscribe(&self) -> broadcast::Receiver<TabEvent>;
}

/// Tab manager owned by a window and shared with its gate
pub type SharedTabManager = Arc<parking_lot::Mutex<TabManagerService>>;

pub struct TabManagerService {
    tabs: Vec<TabModel>,
    histories: TabHistoryManager,
    policy: TabPolicy,
    events: broadcast::Sender<TabEvent>,
}

impl Default for TabManagerService {
    fn default() -> Self {
        Self::new(TabPolicy::default())
    }
}

impl TabManager for TabManagerService {
    fn tabs(&self) -> &[TabModel] {
        &self.tabs
    }

    fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }
}

impl TabManagerService {
    pub fn new(policy: TabPolicy) -> Self {
        Self {
            tabs: Vec::new(),
            histories: TabHistoryManager::new(),
            policy,
            events: tab_event_channel(),
        }
    }

    pub fn into_shared(self) -> SharedTabManager {
        Arc::new(parking_lot::Mutex::new(self))
    }

    pub fn policy(&self) -> &TabPolicy {
        &self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn history(&self, id: TabId) -> Option<&HistoryManager> {
        self.histories.history(self.index_of(id)?)
    }

    // ========================================================================
    // Creation and removal
    // ========================================================================

    pub fn create_tab(
        &mut self,
        title: impl Into<String>,
        path: Option<PathBuf>,
        options: TabOptions,
    ) -> Result<TabModel, TabError> {
        self.check_limit()?;

        let mut title = title.into();
        if title.is_empty() {
            title = self.policy.new_tab_title.clone();
        }

        let mut tab = TabModel::new(title, path);
        tab.is_pinned = options.pinned;
        tab.custom_color = options.color;
        tab.content = options.content;

        let index = options.index.unwrap_or(self.tabs.len()).min(self.tabs.len());
        let history = tab
            .path
            .as_deref()
            .map(HistoryManager::with_initial)
            .unwrap_or_default();

        let id = tab.id;
        self.tabs.insert(index, tab);
        self.histories.insert_tab_history(index, history);
        tracing::debug!(%id, index, "Tab created");
        self.emit(TabEvent::Created { id, index });

        if options.activate || self.tabs.len() == 1 {
            self.mark_active(index, self.active_id());
        }

        Ok(self.tabs[index].clone())
    }

    /// Close a tab. Policy refusals return `Ok(false)` and change nothing.
    pub fn close_tab(&mut self, id: TabId, force: bool) -> Result<bool, TabError> {
        let index = self.require_index(id)?;

        if !force && !self.tabs[index].can_close() {
            tracing::debug!(%id, "Tab refused to close");
            return Ok(false);
        }
        if self.tabs.len() == 1 && !self.policy.allow_close_last_tab {
            tracing::debug!(%id, "Refusing to close the last tab");
            return Ok(false);
        }

        let removed = self.remove_at(index);
        self.emit(TabEvent::Closed { id, index });
        if removed.is_active {
            self.activate_after_removal(index, id);
        }
        tracing::debug!(%id, index, "Tab closed");
        Ok(true)
    }

    /// Close every other tab that is allowed to close. Returns how many closed.
    pub fn close_other_tabs(&mut self, keep: TabId) -> Result<usize, TabError> {
        self.require_index(keep)?;
        let others: Vec<TabId> = self
            .tabs
            .iter()
            .map(|tab| tab.id)
            .filter(|id| *id != keep)
            .collect();

        let mut closed = 0;
        for id in others {
            if self.close_tab(id, false)? {
                closed += 1;
            }
        }
        self.activate_tab(keep)?;
        Ok(closed)
    }

    /// Close tabs after `id` in visual order. Returns how many closed.
    pub fn close_tabs_to_right(&mut self, id: TabId) -> Result<usize, TabError> {
        let index = self.require_index(id)?;
        let right: Vec<TabId> = self.tabs[index + 1..].iter().map(|tab| tab.id).collect();

        let mut closed = 0;
        for other in right {
            if self.close_tab(other, false)? {
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Remove a tab so it can be inserted into another collection.
    ///
    /// No close policy applies: the tab is moving, not closing.
    pub fn take_tab(&mut self, id: TabId) -> Result<DetachedTab, TabError> {
        let index = self.require_index(id)?;
        let history = self.histories.history(index).cloned().unwrap_or_default();
        let mut tab = self.remove_at(index);
        let was_active = std::mem::replace(&mut tab.is_active, false);

        self.emit(TabEvent::Detached { id, index });
        if was_active {
            self.activate_after_removal(index, id);
        }
        tracing::debug!(%id, index, "Tab detached");
        Ok(DetachedTab { tab, history })
    }

    /// Insert a tab taken from another collection and activate it.
    ///
    /// Returns the clamped insert position.
    pub fn insert_tab(&mut self, detached: DetachedTab, index: usize) -> Result<usize, TabError> {
        if self.index_of(detached.id()).is_some() {
            return Err(TabError::DuplicateId(detached.id()));
        }
        self.check_limit()?;
        Ok(self.attach(detached, index, true))
    }

    /// Put back a tab taken by [`take_tab`](Self::take_tab) after its move failed.
    ///
    /// The tab only becomes active again if it was active when taken. The
    /// tab limit does not apply since the slot was this collection's.
    pub fn return_tab(&mut self, detached: DetachedTab, index: usize, was_active: bool) -> Result<usize, TabError> {
        if self.index_of(detached.id()).is_some() {
            return Err(TabError::DuplicateId(detached.id()));
        }
        let activate = was_active || self.active_id().is_none();
        Ok(self.attach(detached, index, activate))
    }

    fn attach(&mut self, detached: DetachedTab, index: usize, activate: bool) -> usize {
        let DetachedTab { mut tab, history } = detached;
        let index = index.min(self.tabs.len());
        let id = tab.id;
        tab.is_active = false;
        self.tabs.insert(index, tab);
        self.histories.insert_tab_history(index, history);
        self.emit(TabEvent::Attached { id, index });
        if activate {
            self.mark_active(index, self.active_id());
        }
        tracing::debug!(%id, index, "Tab attached");
        index
    }

    // ========================================================================
    // Activation and ordering
    // ========================================================================

    /// Make `id` the only active tab. Returns `Ok(false)` if it already was.
    pub fn activate_tab(&mut self, id: TabId) -> Result<bool, TabError> {
        let index = self.require_index(id)?;
        if self.tabs[index].is_active {
            return Ok(false);
        }
        self.mark_active(index, self.active_id());
        Ok(true)
    }

    pub fn navigate_to_next_tab(&mut self) -> Option<TabId> {
        self.activate_relative(1)
    }

    pub fn navigate_to_previous_tab(&mut self) -> Option<TabId> {
        self.activate_relative(-1)
    }

    /// Move a tab to `new_index` (clamped). Returns the final index.
    pub fn move_tab(&mut self, id: TabId, new_index: usize) -> Result<usize, TabError> {
        let from = self.require_index(id)?;
        let to = new_index.min(self.tabs.len() - 1);
        if from == to {
            return Ok(to);
        }

        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        self.histories.move_tab_history(from, to);
        tracing::trace!(%id, from, to, "Tab moved");
        self.emit(TabEvent::Reordered { id, from, to });
        Ok(to)
    }

    /// Clone a tab (fresh id, same history) right after the original and activate it
    pub fn duplicate_tab(&mut self, id: TabId) -> Result<TabModel, TabError> {
        let index = self.require_index(id)?;
        self.check_limit()?;

        let copy = self.tabs[index].duplicate();
        let history = self.histories.history(index).cloned().unwrap_or_default();
        let copy_id = copy.id;
        let target = index + 1;

        self.tabs.insert(target, copy);
        self.histories.insert_tab_history(target, history);
        self.emit(TabEvent::Created {
            id: copy_id,
            index: target,
        });
        self.mark_active(target, self.active_id());
        tracing::debug!(%id, copy = %copy_id, "Tab duplicated");
        Ok(self.tabs[target].clone())
    }

    // ========================================================================
    // Field updates
    // ========================================================================

    pub fn set_tab_color(&mut self, id: TabId, color: TabColor) -> Result<(), TabError> {
        self.update_color(id, Some(color))
    }

    pub fn clear_tab_color(&mut self, id: TabId) -> Result<(), TabError> {
        self.update_color(id, None)
    }

    pub fn set_tab_pinned(&mut self, id: TabId, pinned: bool) -> Result<(), TabError> {
        let index = self.require_index(id)?;
        if self.tabs[index].is_pinned != pinned {
            self.tabs[index].is_pinned = pinned;
            self.emit_change(id, TabChange::Pinned(pinned));
        }
        Ok(())
    }

    pub fn rename_tab(&mut self, id: TabId, title: impl Into<String>) -> Result<(), TabError> {
        let index = self.require_index(id)?;
        let title = title.into();
        if self.tabs[index].title != title {
            self.tabs[index].title = title.clone();
            self.emit_change(id, TabChange::Title(title));
        }
        Ok(())
    }

    pub fn set_unsaved_changes(&mut self, id: TabId, dirty: bool) -> Result<(), TabError> {
        let index = self.require_index(id)?;
        if self.tabs[index].has_unsaved_changes != dirty {
            self.tabs[index].has_unsaved_changes = dirty;
            self.emit_change(id, TabChange::UnsavedChanges(dirty));
        }
        Ok(())
    }

    pub fn set_can_close(&mut self, id: TabId, value: Option<bool>) -> Result<(), TabError> {
        let index = self.require_index(id)?;
        self.tabs[index].set_can_close(value);
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate a tab to `path`, recording it in the tab's history.
    ///
    /// Returns `Ok(false)` when `path` is already the current location.
    pub fn navigate_tab(&mut self, id: TabId, path: impl Into<PathBuf>) -> Result<bool, TabError> {
        let index = self.require_index(id)?;
        let path = path.into();
        if !self.histories.push_path(index, path.clone()) {
            return Ok(false);
        }
        self.apply_location(index, path);
        Ok(true)
    }

    pub fn go_back_in_tab(&mut self, id: TabId) -> Result<Option<PathBuf>, TabError> {
        let index = self.require_index(id)?;
        let path = self.histories.go_back(index);
        Ok(self.apply_history_step(index, path))
    }

    pub fn go_forward_in_tab(&mut self, id: TabId) -> Result<Option<PathBuf>, TabError> {
        let index = self.require_index(id)?;
        let path = self.histories.go_forward(index);
        Ok(self.apply_history_step(index, path))
    }

    pub fn go_up_in_tab(&mut self, id: TabId) -> Result<Option<PathBuf>, TabError> {
        let index = self.require_index(id)?;
        let path = self.histories.go_up(index);
        Ok(self.apply_history_step(index, path))
    }

    // ========================================================================
    // Drag bookkeeping
    // ========================================================================

    /// Flag a tab as being dragged out of `window`. Returns its current index.
    pub fn begin_tab_drag(&mut self, id: TabId, window: WindowId) -> Result<usize, TabError> {
        let index = self.require_index(id)?;
        self.tabs[index].begin_drag(window, index);
        Ok(index)
    }

    /// Clear drag flags. Returns `false` if the tab is no longer here.
    pub fn end_tab_drag(&mut self, id: TabId) -> bool {
        match self.tabs.iter_mut().find(|tab| tab.id == id) {
            Some(tab) => {
                tab.end_drag();
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_index(&self, id: TabId) -> Result<usize, TabError> {
        self.index_of(id).ok_or(TabError::NotFound(id))
    }

    fn check_limit(&self) -> Result<(), TabError> {
        match self.policy.max_tabs {
            Some(max) if self.tabs.len() >= max => Err(TabError::LimitReached(max)),
            _ => Ok(()),
        }
    }

    fn active_id(&self) -> Option<TabId> {
        self.active_tab().map(|tab| tab.id)
    }

    fn remove_at(&mut self, index: usize) -> TabModel {
        let tab = self.tabs.remove(index);
        self.histories.remove_tab_history(index);
        tab
    }

    fn mark_active(&mut self, index: usize, previous: Option<TabId>) {
        for tab in &mut self.tabs {
            tab.is_active = false;
        }
        let tab = &mut self.tabs[index];
        tab.is_active = true;
        tab.last_activated = Some(Utc::now());
        let current = tab.id;

        if previous != Some(current) {
            self.emit(TabEvent::ActiveChanged {
                previous,
                current: Some(current),
            });
        }
    }

    /// Pick the tab now at `index` (or the last one) after the active tab left
    fn activate_after_removal(&mut self, index: usize, removed: TabId) {
        if self.tabs.is_empty() {
            self.emit(TabEvent::ActiveChanged {
                previous: Some(removed),
                current: None,
            });
            return;
        }
        let next = index.min(self.tabs.len() - 1);
        self.mark_active(next, Some(removed));
    }

    fn activate_relative(&mut self, step: isize) -> Option<TabId> {
        let count = self.tabs.len();
        if count == 0 {
            return None;
        }
        let current = self.active_index().unwrap_or(0);
        let next = (current as isize + step).rem_euclid(count as isize) as usize;
        if next != current || self.active_index().is_none() {
            self.mark_active(next, self.active_id());
        }
        Some(self.tabs[next].id)
    }

    fn update_color(&mut self, id: TabId, color: Option<TabColor>) -> Result<(), TabError> {
        let index = self.require_index(id)?;
        if self.tabs[index].custom_color != color {
            self.tabs[index].custom_color = color;
            self.emit_change(id, TabChange::Color(color));
        }
        Ok(())
    }

    fn apply_history_step(&mut self, index: usize, path: Option<PathBuf>) -> Option<PathBuf> {
        let path = path?;
        self.apply_location(index, path.clone());
        Some(path)
    }

    fn apply_location(&mut self, index: usize, path: PathBuf) {
        let tab = &mut self.tabs[index];
        let old_title = tab.title.clone();
        tab.navigate_to(path.as_path());
        let id = tab.id;
        let title = tab.title.clone();

        self.emit_change(id, TabChange::Path(path));
        if title != old_title {
            self.emit_change(id, TabChange::Title(title));
        }
    }

    fn emit_change(&self, id: TabId, change: TabChange) {
        self.emit(TabEvent::Modified { id, change });
    }

    fn emit(&self, event: TabEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
