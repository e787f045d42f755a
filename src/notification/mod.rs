//! Notification targets.
//!
//! Each target accepts a rendered [`NotificationMessage`](crate::core::NotificationMessage)
//! and makes exactly one delivery attempt. Failures are reported as
//! [`DeliveryError`] and never retried.
pub mod dingtalk;

use std::time::Duration;
use thiserror::Error;

pub use dingtalk::DingTalkTarget;

/// Why a single delivery attempt failed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("webhook rejected the message (errcode {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    /// A numeric code for the failure: the HTTP status, the webhook's own
    /// error code, or -1 when neither applies.
    pub fn code(&self) -> i64 {
        match self {
            DeliveryError::Http(e) => e.status().map_or(-1, |s| i64::from(s.as_u16())),
            DeliveryError::Status { status, .. } => i64::from(*status),
            DeliveryError::Rejected { code, .. } => *code,
            DeliveryError::Timeout(_) => -1,
        }
    }
}
