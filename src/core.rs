//! Core domain types and service traits for Dockwatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern how the event loop talks to the container runtime and to
//! notification targets.

use crate::config::ConfigError;
use crate::filters::FilterQuery;
use crate::notification::DeliveryError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// A single lifecycle/health event as reported by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEvent {
    /// Full container identifier.
    pub id: String,
    /// Status string, e.g. `health_status: unhealthy`.
    pub status: String,
    /// Object kind (`container`, `network`, ...).
    pub kind: String,
    /// The object the event is about.
    pub actor: Actor,
    /// Seconds since the epoch. Absent on some runtimes.
    pub time: Option<i64>,
}

/// The object an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actor {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
}

impl RawEvent {
    /// Builds a container event with a `name` attribute.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn container(id: &str, status: &str, name: &str, time: Option<i64>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("name".to_string(), name.to_string());
        Self {
            id: id.to_string(),
            status: status.to_string(),
            kind: "container".to_string(),
            actor: Actor {
                id: id.to_string(),
                attributes,
            },
            time,
        }
    }

    /// The container name, or an empty string if the runtime did not send one.
    pub fn name(&self) -> &str {
        self.actor
            .attributes
            .get("name")
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// A rendered notification, ready to be handed to every target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationMessage {
    pub title: String,
    /// Markdown body with embedded newlines.
    pub body: String,
    /// Ask the chat platform to notify everyone in the room.
    pub mention_all: bool,
}

/// Outcome of one delivery attempt to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Name of the target, as reported by [`NotificationTarget::name`].
    pub target: String,
    pub success: bool,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(target: &str) -> Self {
        Self {
            target: target.to_string(),
            success: true,
            error_code: None,
            error_message: None,
        }
    }

    pub fn failed(target: &str, error: &DeliveryError) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            error_code: Some(error.code()),
            error_message: Some(error.to_string()),
        }
    }
}

// =============================================================================
// Errors shared by the event source and remediation seams
// =============================================================================

/// An error surfaced on the subscription's error channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The runtime closed the stream normally.
    #[error("end of event stream")]
    EndOfStream,

    #[error("event stream transport failed: {0}")]
    Transport(String),
}

/// Failure to establish or keep the event subscription. Always fatal.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("failed to connect to the container runtime: {0}")]
    Connect(#[source] bollard::errors::Error),

    #[error("container runtime refused the subscription (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Stream(StreamError),

    #[error("event stream closed without an end-of-stream marker")]
    Closed,

    #[error("invalid filter query: {0}")]
    Filter(#[from] ConfigError),
}

/// Failure of a restart request. Logged, never fatal.
#[derive(Error, Debug)]
pub enum RemediationError {
    #[error("restart request failed: {0}")]
    Docker(#[source] bollard::errors::Error),

    #[error("runtime refused the restart (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("restart did not complete within {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// Service Traits
// =============================================================================

/// A live subscription: one channel of events, one channel of stream errors.
///
/// Dropping the subscription releases it; the producer notices the closed
/// channels and stops.
#[derive(Debug)]
pub struct Subscription {
    pub events: mpsc::Receiver<RawEvent>,
    pub errors: mpsc::Receiver<StreamError>,
}

/// Produces the runtime's event stream.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Opens a subscription restricted by `filter`.
    ///
    /// # Returns
    /// * `Ok(Subscription)` once the runtime accepted the request
    /// * `Err(SubscriptionError)` if the runtime is unreachable or refuses
    async fn subscribe(&self, filter: &FilterQuery) -> Result<Subscription, SubscriptionError>;
}

/// Restarts containers in response to an unhealthy event.
#[async_trait]
pub trait Remediator: Send + Sync {
    /// Restarts `container_id`, giving it `stop_timeout` to exit before it is
    /// killed.
    async fn restart(&self, container_id: &str, stop_timeout: Duration)
        -> Result<(), RemediationError>;
}

/// A webhook-style endpoint that accepts rendered messages.
#[async_trait]
pub trait NotificationTarget: Send + Sync {
    /// A short, log-safe name for the target.
    fn name(&self) -> &str;

    /// Makes exactly one delivery attempt.
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError>;
}
