//! Manages the lifecycle of spawned background tasks.
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A centralized registry of spawned tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Shutting down within a grace period, aborting whatever is left.
#[derive(Clone, Debug, Default)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    /// Number of tasks that have not finished yet.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn running(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Waits up to `grace` for all managed tasks, then aborts the rest.
    ///
    /// Returns the number of tasks that had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect::<Vec<_>>();
        info!(
            "TaskManager shutting down. Waiting up to {:?} for {} tasks...",
            grace,
            handles.len()
        );

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        let abort_handles: Vec<_> = handles.iter().map(|(_, h)| h.abort_handle()).collect();

        let results = match tokio::time::timeout(
            grace,
            join_all(handles.into_iter().map(|(_, handle)| handle)),
        )
        .await
        {
            Ok(results) => results,
            Err(_) => {
                let unfinished = abort_handles.iter().filter(|h| !h.is_finished()).count();
                warn!(
                    unfinished,
                    "Grace period elapsed, aborting remaining tasks."
                );
                for handle in &abort_handles {
                    handle.abort();
                }
                return unfinished;
            }
        };

        let mut panics = 0;
        for (task_name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panics += 1;
                }
            }
        }

        if panics == 0 {
            info!("All tasks shut down gracefully.");
        }
        0
    }
}
