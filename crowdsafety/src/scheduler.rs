//! Cancelable one-shot delayed tasks.
//!
//! Each pending task is registered under the id of the entity it checks
//! (an SOS task, a reservation), so finishing or removing that entity can
//! abort the check instead of leaving it to fire and no-op.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Handle to a scheduled one-shot task.
#[derive(Debug)]
pub struct ScheduledTask {
    key: String,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task if it has not fired yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// Registry of pending one-shot tasks keyed by entity id.
#[derive(Clone, Default)]
pub struct TaskScheduler {
    pending: Arc<DashMap<String, ScheduledTask>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` once after `delay`.
    ///
    /// Scheduling under a key that already has a pending task replaces (and
    /// aborts) the earlier one.
    pub fn schedule<F>(&self, key: impl Into<String>, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        // The task waits until it is registered, so it can always deregister itself
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if registered_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            // Deregister before running so `work` may reschedule under the same key
            let own_id = tokio::task::id();
            pending.remove_if(&task_key, |_, task| task.handle.id() == own_id);
            trace!(key = %task_key, "Delayed task firing");
            work.await;
        });

        if let Some(previous) = self.pending.insert(
            key.clone(),
            ScheduledTask {
                key: key.clone(),
                handle,
            },
        ) {
            debug!(key = %key, "Replacing pending delayed task");
            previous.cancel();
        }
        let _ = registered_tx.send(());
    }

    /// Cancel the pending task registered under `key`.
    ///
    /// Returns whether a pending task was found.
    pub fn cancel(&self, key: &str) -> bool {
        match self.pending.remove(key) {
            Some((_, task)) => {
                task.cancel();
                debug!(key, "Cancelled delayed task");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .get(key)
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Number of tasks that have not fired or been cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|t| !t.is_finished()).count()
    }
}
