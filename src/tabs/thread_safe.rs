//! Serialised, cancellable access to one window's tab collection.
//!
//! # Gate
//!
//! ```text
//! caller task ──> disposed? ──> cancelled? ──> acquire permit (FIFO, races token)
//!                                                   │
//!                                  cancelled? <─────┘
//!                                      │
//!                                      v
//!                     UiDispatcher::run(body(&mut TabManagerService))
//!                                      │
//!                     permit released when the body returns on the UI thread
//! ```
//!
//! A cancelled or dropped caller never leaves a half-applied mutation: the
//! body either runs to completion on the UI thread or never starts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::OperationConfig;
use crate::state::{TabId, TabModel, TabOptions};
use crate::ui_thread::{DispatchError, UiDispatcher};

use super::service::{DetachedTab, SharedTabManager, TabError, TabManagerService};

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("Tab operations are disposed")]
    Disposed,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Tab(#[from] TabError),
}

/// Diagnostics entry for an operation that has entered the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: u64,
    pub name: &'static str,
    pub started_at: DateTime<Utc>,
    /// Whether the operation holds the permit (false while queued)
    pub acquired: bool,
}

struct Inner {
    manager: SharedTabManager,
    dispatcher: Arc<UiDispatcher>,
    gate: Arc<Semaphore>,
    disposed: AtomicBool,
    next_id: AtomicU64,
    pending: Mutex<BTreeMap<u64, PendingOperation>>,
    dispose_timeout: Duration,
}

/// Per-window gate in front of a [`TabManagerService`]
#[derive(Clone)]
pub struct ThreadSafeTabOperations {
    inner: Arc<Inner>,
}

/// Removes the diagnostics entry when the operation ends, however it ends
struct PendingGuard<'a> {
    pending: &'a Mutex<BTreeMap<u64, PendingOperation>>,
    id: u64,
}

impl PendingGuard<'_> {
    fn mark_acquired(&self) {
        if let Some(entry) = self.pending.lock().get_mut(&self.id) {
            entry.acquired = true;
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

impl ThreadSafeTabOperations {
    pub fn new(
        manager: SharedTabManager,
        dispatcher: Arc<UiDispatcher>,
        config: &OperationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                manager,
                dispatcher,
                gate: Arc::new(Semaphore::new(1)),
                disposed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                pending: Mutex::new(BTreeMap::new()),
                dispose_timeout: config.dispose_timeout(),
            }),
        }
    }

    /// The guarded collection, for read-only access
    pub fn manager(&self) -> &SharedTabManager {
        &self.inner.manager
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Operations currently queued or running, oldest first
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.inner.pending.lock().values().cloned().collect()
    }

    /// Run `body` against the collection on the UI thread, one operation at a time.
    pub async fn execute_safe<F, R>(
        &self,
        name: &'static str,
        cancel: &CancellationToken,
        body: F,
    ) -> Result<R, OperationError>
    where
        F: FnOnce(&mut TabManagerService) -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = &self.inner;
        if self.is_disposed() {
            return Err(OperationError::Disposed);
        }
        if cancel.is_cancelled() {
            tracing::debug!(name, "Operation cancelled before admission");
            return Err(OperationError::Cancelled);
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner.pending.lock().insert(
            id,
            PendingOperation {
                id,
                name,
                started_at: Utc::now(),
                acquired: false,
            },
        );
        let guard = PendingGuard {
            pending: &inner.pending,
            id,
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(name, id, "Operation cancelled while queued");
                return Err(OperationError::Cancelled);
            }
            permit = Arc::clone(&inner.gate).acquire_owned() => {
                permit.map_err(|_| OperationError::Disposed)?
            }
        };

        if cancel.is_cancelled() {
            tracing::debug!(name, id, "Operation cancelled after acquiring the gate");
            return Err(OperationError::Cancelled);
        }
        guard.mark_acquired();
        tracing::trace!(name, id, "Operation running");

        let manager = Arc::clone(&inner.manager);
        let result = inner
            .dispatcher
            .run(move || {
                // Held until the body has finished, even if the caller went away
                let _permit = permit;
                let mut manager = manager.lock();
                body(&mut manager)
            })
            .await;

        if let Err(e) = &result {
            tracing::warn!(name, id, %e, "Tab operation failed to dispatch");
        }
        Ok(result?)
    }

    pub async fn create_tab_safe(
        &self,
        title: impl Into<String>,
        path: Option<PathBuf>,
        options: TabOptions,
        cancel: &CancellationToken,
    ) -> Result<TabModel, OperationError> {
        let title = title.into();
        Ok(self
            .execute_safe("create_tab", cancel, move |tabs| {
                tabs.create_tab(title, path, options)
            })
            .await??)
    }

    pub async fn close_tab_safe(
        &self,
        id: TabId,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, OperationError> {
        Ok(self
            .execute_safe("close_tab", cancel, move |tabs| tabs.close_tab(id, force))
            .await??)
    }

    pub async fn activate_tab_safe(
        &self,
        id: TabId,
        cancel: &CancellationToken,
    ) -> Result<bool, OperationError> {
        Ok(self
            .execute_safe("activate_tab", cancel, move |tabs| tabs.activate_tab(id))
            .await??)
    }

    pub async fn move_tab_safe(
        &self,
        id: TabId,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, OperationError> {
        Ok(self
            .execute_safe("move_tab", cancel, move |tabs| tabs.move_tab(id, index))
            .await??)
    }

    pub async fn take_tab_safe(
        &self,
        id: TabId,
        cancel: &CancellationToken,
    ) -> Result<DetachedTab, OperationError> {
        Ok(self
            .execute_safe("take_tab", cancel, move |tabs| tabs.take_tab(id))
            .await??)
    }

    pub async fn insert_tab_safe(
        &self,
        tab: DetachedTab,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<usize, OperationError> {
        Ok(self
            .execute_safe("insert_tab", cancel, move |tabs| tabs.insert_tab(tab, index))
            .await??)
    }

    /// Stop admitting operations and drain the gate.
    ///
    /// Waits up to the configured timeout for queued and running operations,
    /// then closes the gate so anything still waiting fails with
    /// `OperationError::Disposed`. Returns whether the drain finished in time.
    pub async fn dispose(&self) -> bool {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return true;
        }

        let drained = tokio::time::timeout(inner.dispose_timeout, inner.gate.acquire())
            .await
            .map(|permit| permit.is_ok())
            .unwrap_or(false);
        inner.gate.close();

        if drained {
            tracing::debug!("Tab operations disposed");
        } else {
            tracing::warn!(
                pending = inner.pending.lock().len(),
                timeout_ms = inner.dispose_timeout.as_millis() as u64,
                "Tab operations disposed before in-flight work finished"
            );
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabs::service::TabManager;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn operations_with(names: &[&str], timeout_ms: u64) -> ThreadSafeTabOperations {
        let mut service = TabManagerService::default();
        for name in names {
            service
                .create_tab(*name, None, TabOptions::default())
                .unwrap();
        }
        ThreadSafeTabOperations::new(
            service.into_shared(),
            Arc::new(UiDispatcher::new().unwrap()),
            &OperationConfig {
                dispose_timeout_ms: timeout_ms,
            },
        )
    }

    fn count(ops: &ThreadSafeTabOperations) -> usize {
        ops.manager().lock().count()
    }

    /// Occupy the gate until the returned sender is used (or dropped)
    async fn hold_gate(ops: &ThreadSafeTabOperations) -> (mpsc::Sender<()>, tokio::task::JoinHandle<()>) {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let holder = ops.clone();
        let handle = tokio::spawn(async move {
            holder
                .execute_safe("hold", &CancellationToken::new(), move |_| {
                    let _ = started_tx.send(());
                    let _ = release_rx.recv();
                })
                .await
                .unwrap();
        });
        started_rx.await.unwrap();
        (release_tx, handle)
    }

    // === Basic operations ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_close_through_gate() {
        let ops = operations_with(&["a"], 1000);
        let token = CancellationToken::new();

        let tab = ops
            .create_tab_safe("b", None, TabOptions::activated(), &token)
            .await
            .unwrap();
        assert_eq!(count(&ops), 2);
        assert!(ops.close_tab_safe(tab.id, false, &token).await.unwrap());
        assert_eq!(count(&ops), 1);
        assert!(ops.pending_operations().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tab_errors_propagate() {
        let ops = operations_with(&["a"], 1000);
        let unknown = TabId::new();

        let result = ops
            .close_tab_safe(unknown, false, &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(OperationError::Tab(TabError::NotFound(id))) if id == unknown
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_body_runs_on_ui_thread() {
        let ops = operations_with(&["a"], 1000);
        let caller = std::thread::current().id();

        let thread = ops
            .execute_safe("probe", &CancellationToken::new(), |_| {
                std::thread::current().id()
            })
            .await
            .unwrap();
        assert_ne!(thread, caller);
    }

    // === Mutual exclusion ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_gate_serialises_operations() {
        let ops = operations_with(&["a"], 1000);
        let (release, holder) = hold_gate(&ops).await;

        let waiter = {
            let ops = ops.clone();
            tokio::spawn(async move {
                ops.create_tab_safe("b", None, TabOptions::default(), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let pending = ops.pending_operations();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].acquired);
        assert_eq!(pending[1].name, "create_tab");
        assert!(!pending[1].acquired);
        assert_eq!(count(&ops), 1);

        release.send(()).unwrap();
        holder.await.unwrap();
        waiter.await.unwrap().unwrap();
        assert_eq!(count(&ops), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_operations_never_overlap() {
        let ops = operations_with(&["a"], 1000);
        let running = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let ops = ops.clone();
                let running = Arc::clone(&running);
                let overlaps = Arc::clone(&overlaps);
                tokio::spawn(async move {
                    ops.execute_safe("create", &CancellationToken::new(), move |tabs| {
                        if running.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tabs.create_tab(format!("t{i}"), None, TabOptions::default())
                            .unwrap();
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(count(&ops), 17);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queued_operations_run_in_fifo_order() {
        let ops = operations_with(&["a"], 1000);
        let (release, holder) = hold_gate(&ops).await;

        let mut tasks = Vec::new();
        for name in ["b", "c", "d"] {
            let ops = ops.clone();
            tasks.push(tokio::spawn(async move {
                ops.create_tab_safe(name, None, TabOptions::default(), &CancellationToken::new())
                    .await
            }));
            // Let each waiter queue before the next
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        release.send(()).unwrap();
        holder.await.unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let titles: Vec<String> = ops
            .manager()
            .lock()
            .tabs()
            .iter()
            .map(|tab| tab.title.clone())
            .collect();
        assert_eq!(titles, ["a", "b", "c", "d"]);
    }

    // === Cancellation ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_before_acquire_has_no_effect() {
        let ops = operations_with(&["a", "b"], 1000);
        let token = CancellationToken::new();
        token.cancel();
        let before: Vec<TabModel> = ops.manager().lock().tabs().to_vec();

        let result = ops
            .create_tab_safe("c", None, TabOptions::activated(), &token)
            .await;

        assert!(matches!(result, Err(OperationError::Cancelled)));
        assert_eq!(ops.manager().lock().tabs(), before.as_slice());
        assert!(ops.pending_operations().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_while_queued() {
        let ops = operations_with(&["a"], 1000);
        let (release, holder) = hold_gate(&ops).await;
        let token = CancellationToken::new();

        let waiter = {
            let ops = ops.clone();
            let token = token.clone();
            tokio::spawn(async move {
                ops.create_tab_safe("b", None, TabOptions::default(), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(OperationError::Cancelled)
        ));
        release.send(()).unwrap();
        holder.await.unwrap();

        assert_eq!(count(&ops), 1);
        assert!(ops.pending_operations().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_future_releases_diagnostics() {
        let ops = operations_with(&["a"], 1000);
        let (release, holder) = hold_gate(&ops).await;

        let attempt = tokio::time::timeout(
            Duration::from_millis(20),
            ops.create_tab_safe("b", None, TabOptions::default(), &CancellationToken::new()),
        )
        .await;
        assert!(attempt.is_err());
        assert_eq!(ops.pending_operations().len(), 1);

        release.send(()).unwrap();
        holder.await.unwrap();
        assert!(ops.pending_operations().is_empty());

        // Gate is usable again
        ops.create_tab_safe("c", None, TabOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count(&ops), 2);
    }

    // === Disposal ===

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispose_when_idle_is_clean() {
        let ops = operations_with(&["a"], 1000);

        assert!(ops.dispose().await);
        assert!(ops.is_disposed());

        let result = ops
            .create_tab_safe("b", None, TabOptions::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(OperationError::Disposed)));
        // Second dispose is a no-op
        assert!(ops.dispose().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispose_timeout_fails_waiters() {
        let ops = operations_with(&["a"], 50);
        let (release, holder) = hold_gate(&ops).await;

        let waiter = {
            let ops = ops.clone();
            tokio::spawn(async move {
                ops.create_tab_safe("b", None, TabOptions::default(), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!ops.dispose().await);
        assert!(matches!(
            waiter.await.unwrap(),
            Err(OperationError::Disposed)
        ));

        release.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(count(&ops), 1);
    }
}
