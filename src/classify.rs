//! Maps raw status strings onto the small set of outcomes the rest of the
//! pipeline cares about. New status vocabularies are added here only.

use std::fmt;

/// Status sent when a container's health check starts failing.
pub const UNHEALTHY_STATUS: &str = "health_status: unhealthy";
/// Status sent when a container's health check passes again.
pub const HEALTHY_STATUS: &str = "health_status: healthy";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Classification {
    Unhealthy,
    Healthy,
    /// Anything else; keeps the literal status for display.
    Other(String),
}

impl Classification {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Classification::Unhealthy)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Unhealthy => f.write_str("unhealthy"),
            Classification::Healthy => f.write_str("healthy"),
            Classification::Other(status) => f.write_str(status),
        }
    }
}

/// Classifies a status string. Total: every input maps to exactly one outcome.
pub fn classify(status: &str) -> Classification {
    match status {
        UNHEALTHY_STATUS => Classification::Unhealthy,
        HEALTHY_STATUS => Classification::Healthy,
        other => Classification::Other(other.to_string()),
    }
}
