//! Fan-out of rendered notifications to every configured target.
//!
//! [`Dispatcher`] delivers one message to all targets concurrently, each
//! attempt bounded by a timeout and isolated from the others.
//! [`DispatchPool`] puts a fixed number of workers and a bounded queue in
//! front of it, so the event loop can hand messages off without waiting and
//! without spawning an unbounded number of tasks during event bursts.

use crate::core::{DeliveryResult, NotificationMessage, NotificationTarget};
use crate::notification::DeliveryError;
use crate::task_manager::TaskManager;
use async_channel::{Receiver, Sender, TrySendError};
use futures::future::{join_all, FutureExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Delivers messages to a fixed set of targets.
pub struct Dispatcher {
    targets: Vec<Arc<dyn NotificationTarget>>,
    delivery_timeout: Duration,
}

impl Dispatcher {
    pub fn new(targets: Vec<Arc<dyn NotificationTarget>>, delivery_timeout: Duration) -> Self {
        Self {
            targets,
            delivery_timeout,
        }
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Makes one delivery attempt per target, all at once.
    ///
    /// Always returns exactly one result per target, in target order. A
    /// failed, slow or panicking target only affects its own result. The
    /// attempts run inside the calling task, so cancelling it cancels them.
    #[instrument(skip_all, fields(title = %message.title, targets = self.targets.len()))]
    pub async fn dispatch(&self, message: Arc<NotificationMessage>) -> Vec<DeliveryResult> {
        let attempts = self.targets.iter().map(|target| {
            AssertUnwindSafe(deliver_once(target.as_ref(), &message, self.delivery_timeout))
                .catch_unwind()
        });

        let results: Vec<DeliveryResult> = join_all(attempts)
            .await
            .into_iter()
            .zip(&self.targets)
            .map(|(outcome, target)| match outcome {
                Ok(result) => result,
                Err(_) => DeliveryResult {
                    target: target.name().to_string(),
                    success: false,
                    error_code: Some(-1),
                    error_message: Some("delivery panicked".to_string()),
                },
            })
            .collect();

        for result in results.iter().filter(|r| !r.success) {
            info!(
                target = %result.target,
                code = ?result.error_code,
                error = result.error_message.as_deref().unwrap_or_default(),
                "Failed to deliver notification"
            );
        }
        results
    }
}

async fn deliver_once(
    target: &dyn NotificationTarget,
    message: &NotificationMessage,
    timeout: Duration,
) -> DeliveryResult {
    let outcome = match tokio::time::timeout(timeout, target.deliver(message)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(DeliveryError::Timeout(timeout)),
    };
    match outcome {
        Ok(()) => DeliveryResult::delivered(target.name()),
        Err(e) => DeliveryResult::failed(target.name(), &e),
    }
}

/// What happened to a message handed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// The queue was full; the message was dropped.
    DroppedFull,
    /// The pool is shutting down.
    Closed,
}

/// A fixed set of workers draining a bounded queue of messages.
pub struct DispatchPool {
    queue: Sender<Arc<NotificationMessage>>,
    tasks: TaskManager,
}

/// A cheap, cloneable handle used to submit messages to a [`DispatchPool`].
#[derive(Clone)]
pub struct DispatchHandle {
    queue: Sender<Arc<NotificationMessage>>,
}

impl DispatchPool {
    /// Spawns `workers` tasks sharing a queue of `queue_capacity` messages.
    pub fn start(dispatcher: Arc<Dispatcher>, workers: usize, queue_capacity: usize) -> Self {
        let (queue, rx) = async_channel::bounded(queue_capacity.max(1));
        let tasks = TaskManager::new();
        info!(
            workers,
            queue_capacity,
            targets = dispatcher.target_count(),
            "Starting dispatch pool"
        );
        for worker_id in 0..workers.max(1) {
            tasks.spawn("DispatchWorker", run_worker(worker_id, rx.clone(), dispatcher.clone()));
        }
        Self { queue, tasks }
    }

    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            queue: self.queue.clone(),
        }
    }

    /// Stops accepting messages and gives queued and in-flight deliveries up
    /// to `grace` to finish. Returns the number of workers that were aborted;
    /// their unfinished deliveries are dropped with them.
    pub async fn shutdown(self, grace: Duration) -> usize {
        let pending = self.queue.len();
        self.queue.close();
        info!(pending, "Dispatch pool closed, draining queued notifications.");
        self.tasks.shutdown(grace).await
    }
}

impl DispatchHandle {
    /// Queues a message without waiting. Drops it if the queue is full.
    pub fn submit(&self, message: Arc<NotificationMessage>) -> SubmitOutcome {
        match self.queue.try_send(message) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Full(message)) => {
                warn!(title = %message.title, "Dispatch queue is full, dropping notification.");
                SubmitOutcome::DroppedFull
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Dispatch pool is closed, notification not sent.");
                SubmitOutcome::Closed
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Receiver<Arc<NotificationMessage>>,
    dispatcher: Arc<Dispatcher>,
) {
    debug!(worker_id, "Dispatch worker started");
    while let Ok(message) = rx.recv().await {
        let results = dispatcher.dispatch(message).await;
        let delivered = results.iter().filter(|r| r.success).count();
        debug!(worker_id, delivered, total = results.len(), "Dispatch finished");
    }
    debug!(worker_id, "Dispatch queue closed, worker exiting.");
}
