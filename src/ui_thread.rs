//! The single UI thread.
//!
//! Every mutation of a window's tab collection runs here. Callers on any
//! thread or task hand a closure to [`UiDispatcher::run`] and await its
//! result; the dispatcher thread drains jobs in submission order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("UI dispatcher is shut down")]
    Closed,
    #[error("UI job was dropped before completing")]
    Dropped,
    #[error("Failed to spawn UI thread: {0}")]
    Spawn(#[from] std::io::Error),
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Owner of the UI thread and its job queue
pub struct UiDispatcher {
    job_tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UiDispatcher {
    pub fn new() -> Result<Self, DispatchError> {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();

        let handle = std::thread::Builder::new()
            .name("ui".to_string())
            .spawn(move || {
                tracing::debug!("UI thread started");
                while let Some(job) = job_rx.blocking_recv() {
                    // A panicking job drops its reply sender; the caller sees `Dropped`
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("UI job panicked");
                    }
                }
                tracing::debug!("UI thread stopped");
            })?;

        Ok(Self {
            job_tx: Mutex::new(Some(job_tx)),
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn is_ui_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Run `f` on the UI thread and wait for its result.
    ///
    /// Runs inline when already on the UI thread.
    pub async fn run<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            return Ok(f());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = reply_tx.send(f());
        });

        {
            let job_tx = self.job_tx.lock();
            let Some(job_tx) = job_tx.as_ref() else {
                return Err(DispatchError::Closed);
            };
            job_tx.send(job).map_err(|_| DispatchError::Closed)?;
        }

        reply_rx.await.map_err(|_| DispatchError::Dropped)
    }

    /// Stop accepting jobs and wait for the queue to drain.
    pub fn shutdown(&self) {
        self.job_tx.lock().take();

        if self.is_ui_thread() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("UI thread terminated abnormally");
            }
        }
    }
}

impl Drop for UiDispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the thread exit once queued jobs finish
        self.job_tx.lock().take();
    }
}
