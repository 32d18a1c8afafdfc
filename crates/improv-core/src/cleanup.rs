// ── Cleanup registry ──
//
// Owned, injectable set of release actions for transient OS state (the
// temporary Wi-Fi profile). Actions run at most once: either explicitly
// through their handle, or at shutdown through `run_all()`, which fans
// them out concurrently and gathers every outcome. An action started
// through its handle runs as its own task, so dropping the caller midway
// cannot cut it short; `run_all()` waits for such tasks to finish.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, join_all};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::CleanupError;

/// A release action. Consumed when it runs.
pub type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CleanupError>> + Send>;

struct Entry {
    id: u64,
    label: String,
    action: CleanupAction,
}

struct RegistryInner {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    /// Actions started through a handle that may still be running.
    in_flight: TaskTracker,
}

impl Default for RegistryInner {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            in_flight: TaskTracker::new(),
        }
    }
}

/// Process-lifetime set of release actions.
///
/// Cheaply cloneable via `Arc`. Pass it to whatever creates transient
/// state; the binary drains it on signals and fatal errors.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    inner: Arc<RegistryInner>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release action and get a handle to run or drop it early.
    pub fn register<F, Fut>(&self, label: impl Into<String>, action: F) -> CleanupHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), CleanupError>> + Send + 'static,
    {
        let label = label.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, label = %label, "registering cleanup");

        let boxed: CleanupAction = Box::new(move || Box::pin(action()));
        self.entries().push(Entry {
            id,
            label: label.clone(),
            action: boxed,
        });

        CleanupHandle {
            id,
            label,
            registry: self.clone(),
        }
    }

    /// Number of actions still waiting to run.
    pub fn pending(&self) -> usize {
        self.entries().len()
    }

    /// Whether `run_all()` has already fired.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Run every registered action once, newest first, concurrently.
    ///
    /// Failures are logged one by one and returned as a batch; they never
    /// abort sibling actions. Also waits for actions already started
    /// through a handle. Only the first call does anything.
    pub async fn run_all(&self) -> Vec<CleanupError> {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("cleanup already ran, skipping");
            return Vec::new();
        }

        let entries: Vec<Entry> = {
            let mut guard = self.entries();
            guard.drain(..).rev().collect()
        };
        debug!(
            count = entries.len(),
            in_flight = self.inner.in_flight.len(),
            "running registered cleanups"
        );

        let labels: Vec<String> = entries.iter().map(|e| e.label.clone()).collect();
        let results = join_all(entries.into_iter().map(|e| (e.action)())).await;

        self.inner.in_flight.close();
        self.inner.in_flight.wait().await;

        results
            .into_iter()
            .zip(labels)
            .filter_map(|(result, label)| match result {
                Ok(()) => None,
                Err(err) => {
                    warn!(cleanup = %label, error = %err.reason, "cleanup failed");
                    Some(err)
                }
            })
            .collect()
    }

    fn take(&self, id: u64) -> Option<Entry> {
        let mut guard = self.entries();
        let pos = guard.iter().position(|e| e.id == id)?;
        Some(guard.remove(pos))
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        // Entries stay consistent across a panicking holder: every mutation
        // is a single push/remove/drain.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one registered action.
///
/// Dropping the handle leaves the action registered for shutdown.
pub struct CleanupHandle {
    id: u64,
    label: String,
    registry: CleanupRegistry,
}

impl CleanupHandle {
    /// Remove the action without running it.
    /// Returns `false` if it already ran or was removed.
    pub fn deregister(self) -> bool {
        self.registry.take(self.id).is_some()
    }

    /// Remove the action and run it now.
    ///
    /// The action runs as a tracked task: if this future is dropped, the
    /// action still completes and `run_all()` waits for it. Returns
    /// `Ok(())` without doing anything if shutdown already ran it.
    pub async fn run(self) -> Result<(), CleanupError> {
        let Some(entry) = self.registry.take(self.id) else {
            debug!(cleanup = %self.label, "cleanup already ran");
            return Ok(());
        };

        let Entry { label, action, .. } = entry;
        let task_label = label.clone();
        let task = self.registry.inner.in_flight.spawn(async move {
            let result = action().await;
            if let Err(ref err) = result {
                warn!(cleanup = %task_label, error = %err.reason, "cleanup failed");
            }
            result
        });

        task.await
            .unwrap_or_else(|e| Err(CleanupError::new(label, format!("cleanup task failed: {e}"))))
    }
}
