//! Tracked background work.
//!
//! Handlers hand deferred work (e.g. sending a welcome e-mail) to
//! [`BackgroundTasks::spawn`], which returns immediately. Every task is
//! registered on a shared [`TaskTracker`] so the lifecycle manager can wait
//! for it during drain. Errors and panics inside a task are logged and
//! counted; they never reach the caller.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use tokio_util::task::TaskTracker;

use crate::observability::metrics;

/// Returned when work is submitted after the server has stopped.
#[derive(Debug, thiserror::Error)]
#[error("background task '{name}' rejected: server has stopped")]
pub struct TaskRejected {
    pub name: &'static str,
}

#[derive(Debug, Default)]
struct Inner {
    tracker: TaskTracker,
    /// Set once the lifecycle reaches Stopped. Guarded together with spawn
    /// so no task slips in after the final wait.
    stopped: Mutex<bool>,
}

/// Registry of in-flight background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` detached from the caller.
    pub fn spawn<F, E>(&self, name: &'static str, task: F) -> Result<(), TaskRejected>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let stopped = self.inner.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            tracing::warn!(task = name, "Background task rejected after stop");
            metrics::record_background_task("rejected");
            return Err(TaskRejected { name });
        }

        self.inner.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "Background task completed");
                    metrics::record_background_task("completed");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = %e, "Background task failed");
                    metrics::record_background_task("failed");
                }
                Err(panic) => {
                    tracing::error!(task = name, panic = %panic_message(&*panic), "Background task panicked");
                    metrics::record_background_task("panicked");
                }
            }
        });
        Ok(())
    }

    /// Tasks spawned and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Wait until every task has finished. Tasks spawned while waiting are
    /// waited for as well.
    pub async fn wait(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// Refuse all further work.
    pub fn stop(&self) {
        let mut stopped = self.inner.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.inner.tracker.close();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
