//! Event payloads for tab and window lifecycle notifications.
//!
//! # Event Flow
//!
//! ```text
//! TabManagerService (one per window)          WindowLifecycleManager (one per process)
//!        │ broadcast::Sender<TabEvent>                │ broadcast::Sender<WindowEvent>
//!        v                                            v
//!  service.subscribe()                         registry.subscribe()
//!   - legacy projection refresh                  - drag target bookkeeping
//!   - UI re-render                               - diagnostics
//! ```
//!
//! Events are sent after the mutation has been committed, from the thread
//! that performed it (the UI thread for gated operations). Sending never
//! blocks; slow subscribers observe `RecvError::Lagged` rather than stalling
//! the sender.

use tokio::sync::broadcast;

use crate::state::{TabColor, TabId};
use crate::window::registry::WindowId;

/// Capacity of each tab event channel
pub const TAB_EVENT_CAPACITY: usize = 100;

/// Capacity of the window lifecycle channel
pub const WINDOW_EVENT_CAPACITY: usize = 32;

/// Field-level change carried by `TabEvent::Modified`
#[derive(Debug, Clone, PartialEq)]
pub enum TabChange {
    Title(String),
    Color(Option<TabColor>),
    Pinned(bool),
    UnsavedChanges(bool),
    Path(std::path::PathBuf),
}

/// Committed change to a window's tab collection
#[derive(Debug, Clone, PartialEq)]
pub enum TabEvent {
    Created {
        id: TabId,
        index: usize,
    },
    Closed {
        id: TabId,
        index: usize,
    },
    /// Tab removed to be inserted elsewhere (transfer or detach)
    Detached {
        id: TabId,
        index: usize,
    },
    /// Tab inserted from another collection
    Attached {
        id: TabId,
        index: usize,
    },
    ActiveChanged {
        previous: Option<TabId>,
        current: Option<TabId>,
    },
    Reordered {
        id: TabId,
        from: usize,
        to: usize,
    },
    Modified {
        id: TabId,
        change: TabChange,
    },
}

/// Window registry notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Registered(WindowId),
    Unregistered(WindowId),
    Focused(WindowId),
}

pub(crate) fn tab_event_channel() -> broadcast::Sender<TabEvent> {
    broadcast::channel(TAB_EVENT_CAPACITY).0
}

pub(crate) fn window_event_channel() -> broadcast::Sender<WindowEvent> {
    broadcast::channel(WINDOW_EVENT_CAPACITY).0
}
