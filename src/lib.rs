/// Dockwatch - relays container health events to chat webhooks
///
/// This library provides the event loop that consumes the container
/// runtime's event stream, classifies and renders each event, fans the
/// resulting notification out to every configured webhook, and optionally
/// restarts containers that turn unhealthy.
pub mod app;
pub mod classify;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod docker;
pub mod event_loop;
pub mod filters;
pub mod formatting;
pub mod notification;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
