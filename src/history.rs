use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Back/forward navigation history for a single tab
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryManager {
    history: Vec<PathBuf>,
    current_index: usize,
}

impl HistoryManager {
    /// Create a new empty history manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history whose only entry is `path`
    pub fn with_initial(path: impl Into<PathBuf>) -> Self {
        let mut history = Self::new();
        history.push(path);
        history
    }

    /// Push a new path to the history
    /// Clears forward history if not at the end
    ///
    /// Returns `false` when the path equals the current entry (nothing pushed).
    pub fn push(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        // Don't add duplicate if it's the same as current
        if self.current_path() == Some(path.as_path()) {
            return false;
        }

        if self.history.is_empty() {
            self.history.push(path);
            self.current_index = 0;
        } else {
            // Remove all items after current index (forward history)
            self.history.truncate(self.current_index + 1);
            self.history.push(path);
            self.current_index += 1;
        }
        true
    }

    /// Check if we can go back
    pub fn can_go_back(&self) -> bool {
        self.current_index > 0
    }

    /// Check if we can go forward
    pub fn can_go_forward(&self) -> bool {
        !self.history.is_empty() && self.current_index < self.history.len() - 1
    }

    /// Go back in history, returns the previous path
    pub fn go_back(&mut self) -> Option<&Path> {
        if self.can_go_back() {
            self.current_index -= 1;
            return self.current_path();
        }
        None
    }

    /// Go forward in history, returns the next path
    pub fn go_forward(&mut self) -> Option<&Path> {
        if self.can_go_forward() {
            self.current_index += 1;
            return self.current_path();
        }
        None
    }

    /// Navigate to the parent of the current path
    ///
    /// The parent is pushed like any other navigation, so forward history is
    /// dropped. Returns `None` at a filesystem root or on empty history.
    pub fn go_up(&mut self) -> Option<&Path> {
        let parent = self.current_path()?.parent()?.to_path_buf();
        self.push(parent);
        self.current_path()
    }

    /// Get the current path
    pub fn current_path(&self) -> Option<&Path> {
        self.history.get(self.current_index).map(PathBuf::as_path)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[PathBuf] {
        &self.history
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Histories for every tab of one window, keyed by tab position
///
/// Keys follow the tab collection's indices, so every structural change to
/// the collection must be mirrored here with the same index arithmetic.
/// `TabManagerService` owns one of these and does that in the same call that
/// changes the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabHistoryManager {
    histories: BTreeMap<usize, HistoryManager>,
}

impl TabHistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the history at `tab_index`
    pub fn init_tab_history(&mut self, tab_index: usize, initial_path: Option<&Path>) {
        let history = initial_path
            .map(HistoryManager::with_initial)
            .unwrap_or_default();
        self.histories.insert(tab_index, history);
    }

    /// Make room at `tab_index` and place `history` there
    ///
    /// Every key at or above `tab_index` shifts up by one.
    pub fn insert_tab_history(&mut self, tab_index: usize, history: HistoryManager) {
        let shifted = self.histories.split_off(&tab_index);
        self.histories
            .extend(shifted.into_iter().map(|(index, h)| (index + 1, h)));
        self.histories.insert(tab_index, history);
    }

    pub fn push_path(&mut self, tab_index: usize, path: impl Into<PathBuf>) -> bool {
        self.histories
            .entry(tab_index)
            .or_default()
            .push(path.into())
    }

    pub fn go_back(&mut self, tab_index: usize) -> Option<PathBuf> {
        self.histories
            .get_mut(&tab_index)?
            .go_back()
            .map(Path::to_path_buf)
    }

    pub fn go_forward(&mut self, tab_index: usize) -> Option<PathBuf> {
        self.histories
            .get_mut(&tab_index)?
            .go_forward()
            .map(Path::to_path_buf)
    }

    pub fn go_up(&mut self, tab_index: usize) -> Option<PathBuf> {
        self.histories
            .get_mut(&tab_index)?
            .go_up()
            .map(Path::to_path_buf)
    }

    /// Remove the history at `tab_index`, shifting higher keys down by one
    ///
    /// Returns the removed history so a transferred tab can carry it along.
    pub fn remove_tab_history(&mut self, tab_index: usize) -> Option<HistoryManager> {
        let removed = self.histories.remove(&tab_index);
        let shifted = self.histories.split_off(&tab_index);
        self.histories
            .extend(shifted.into_iter().map(|(index, h)| (index - 1, h)));
        removed
    }

    /// Mirror a tab move from `source_index` to `target_index`
    ///
    /// Stable block shift (same as `Vec::remove` + `Vec::insert`): keys between
    /// source and target, target included, slide one step toward the source,
    /// then the source's history lands on the target.
    pub fn move_tab_history(&mut self, source_index: usize, target_index: usize) {
        if source_index == target_index {
            return;
        }
        let moving = self.histories.remove(&source_index);
        if source_index < target_index {
            for index in source_index + 1..=target_index {
                if let Some(history) = self.histories.remove(&index) {
                    self.histories.insert(index - 1, history);
                }
            }
        } else {
            for index in (target_index..source_index).rev() {
                if let Some(history) = self.histories.remove(&index) {
                    self.histories.insert(index + 1, history);
                }
            }
        }
        if let Some(history) = moving {
            self.histories.insert(target_index, history);
        }
    }

    pub fn history(&self, tab_index: usize) -> Option<&HistoryManager> {
        self.histories.get(&tab_index)
    }

    pub fn keys(&self) -> Vec<usize> {
        self.histories.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}
