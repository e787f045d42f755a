//! The top-level coordinator: pulls events and stream errors off a
//! subscription and drives classification, rendering, dispatch and
//! remediation for each event, strictly one event at a time.

use crate::classify::classify;
use crate::core::{
    RawEvent, RemediationError, Remediator, StreamError, Subscription, SubscriptionError,
};
use crate::dispatch::{DispatchHandle, SubmitOutcome};
use crate::formatting::{short_id, Renderer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// How remediation is performed when an event is classified as unhealthy.
#[derive(Clone)]
pub struct RemediationPolicy {
    pub remediator: Arc<dyn Remediator>,
    /// Passed to the runtime as the container's stop timeout.
    pub restart_timeout: Duration,
    /// Upper bound on the whole restart call.
    pub call_timeout: Duration,
}

/// Why the loop stopped without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The runtime closed the stream normally.
    EndOfStream,
    /// A shutdown signal was received.
    Shutdown,
}

/// Counters kept while the loop runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub events: u64,
    pub queued: u64,
    pub dropped: u64,
    pub restarts: u64,
    pub restart_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub exit: ExitReason,
    pub stats: LoopStats,
}

pub struct EventLoop {
    renderer: Renderer,
    dispatch: DispatchHandle,
    remediation: Option<RemediationPolicy>,
    stats: LoopStats,
}

impl EventLoop {
    pub fn new(
        renderer: Renderer,
        dispatch: DispatchHandle,
        remediation: Option<RemediationPolicy>,
    ) -> Self {
        Self {
            renderer,
            dispatch,
            remediation,
            stats: LoopStats::default(),
        }
    }

    /// Runs until the stream ends, a fatal stream error arrives, or
    /// `shutdown_rx` fires. The subscription is released on return.
    ///
    /// Events already buffered ahead of a stream error are processed before
    /// the error is acted on. Dropping the shutdown sender is not a shutdown
    /// request; the loop then runs until the stream ends or fails.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        mut subscription: Subscription,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<LoopSummary, SubscriptionError> {
        info!("Waiting for container events...");
        let mut events_closed = false;
        let mut errors_closed = false;
        let mut shutdown_open = true;

        let exit = loop {
            if events_closed && errors_closed {
                error!("Event subscription closed without an end-of-stream marker.");
                self.log_stats();
                return Err(SubscriptionError::Closed);
            }

            tokio::select! {
                biased;
                changed = shutdown_rx.changed(), if shutdown_open => {
                    match changed {
                        Ok(()) => {
                            info!("Event loop received shutdown signal.");
                            break ExitReason::Shutdown;
                        }
                        Err(_) => {
                            debug!("Shutdown sender dropped, running until the stream ends.");
                            shutdown_open = false;
                        }
                    }
                }
                event = subscription.events.recv(), if !events_closed => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            debug!("Event channel closed, waiting for stream status.");
                            events_closed = true;
                        }
                    }
                }
                stream_error = subscription.errors.recv(), if !errors_closed => {
                    match stream_error {
                        Some(StreamError::EndOfStream) => {
                            info!("Event stream ended.");
                            break ExitReason::EndOfStream;
                        }
                        Some(e) => {
                            error!(error = %e, "Event stream failed.");
                            self.log_stats();
                            return Err(SubscriptionError::Stream(e));
                        }
                        None => {
                            debug!("Stream error channel closed.");
                            errors_closed = true;
                        }
                    }
                }
            }
        };

        self.log_stats();
        Ok(LoopSummary {
            exit,
            stats: self.stats,
        })
    }

    async fn handle_event(&mut self, event: RawEvent) {
        self.stats.events += 1;
        let classification = classify(&event.status);
        info!(
            id = short_id(&event.id),
            name = event.name(),
            status = %event.status,
            "Received container event"
        );

        let message = Arc::new(self.renderer.render(&event, &classification));
        match self.dispatch.submit(message) {
            SubmitOutcome::Queued => self.stats.queued += 1,
            SubmitOutcome::DroppedFull | SubmitOutcome::Closed => self.stats.dropped += 1,
        }

        if classification.is_unhealthy() {
            if let Some(policy) = self.remediation.clone() {
                self.remediate(&policy, &event).await;
            }
        }
    }

    async fn remediate(&mut self, policy: &RemediationPolicy, event: &RawEvent) {
        if event.id.is_empty() {
            info!(name = event.name(), "Unhealthy event has no container id, skipping restart.");
            return;
        }

        let id = short_id(&event.id);
        info!(id, name = event.name(), "Restarting unhealthy container");
        let restart = policy.remediator.restart(&event.id, policy.restart_timeout);
        let outcome = match tokio::time::timeout(policy.call_timeout, restart).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RemediationError::Timeout(policy.call_timeout)),
        };
        match outcome {
            Ok(()) => {
                self.stats.restarts += 1;
                info!(id, "Container restarted.");
            }
            Err(e) => {
                self.stats.restart_failures += 1;
                info!(id, error = %e, "Failed to restart container");
            }
        }
    }

    fn log_stats(&self) {
        info!(
            events = self.stats.events,
            queued = self.stats.queued,
            dropped = self.stats.dropped,
            restarts = self.stats.restarts,
            restart_failures = self.stats.restart_failures,
            "Event loop finished."
        );
    }
}
