//! Translation of the declarative filter configuration into the runtime's
//! native filter query.
//!
//! The Docker Engine expects `filters` as a JSON object mapping each axis to
//! a set of accepted values, e.g. `{"name":{"web-1":true},"event":{"die":true}}`.
//! Axes are ANDed together, values within an axis are ORed. An axis that is
//! absent from the object is unconstrained.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Include-lists for each filter axis. Empty lists mean "no constraint".
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EventFilterConfig {
    /// Container names to watch.
    #[serde(default)]
    pub name: Vec<String>,
    /// Event actions, e.g. `health_status`, `die`.
    #[serde(default)]
    pub event: Vec<String>,
    /// Object kinds, e.g. `container`.
    #[serde(default, rename = "type")]
    pub kind: Vec<String>,
}

/// A filter query in the runtime's grammar.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct FilterQuery(BTreeMap<String, BTreeMap<String, bool>>);

impl FilterQuery {
    /// True when no axis is constrained.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The accepted values for one axis, if it is constrained.
    pub fn values(&self, axis: &str) -> Option<Vec<&str>> {
        self.0
            .get(axis)
            .map(|values| values.keys().map(String::as_str).collect())
    }

    /// The query as axis to accepted values, the shape the Docker client
    /// takes.
    pub fn to_map(&self) -> HashMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(axis, values)| (axis.clone(), values.keys().cloned().collect()))
            .collect()
    }

    /// Serializes the query for logging and the `filters` request parameter.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// Builds the runtime filter query from the configured include-lists.
pub fn build(config: &EventFilterConfig) -> Result<FilterQuery, ConfigError> {
    let mut query = BTreeMap::new();
    for (axis, values) in [
        ("name", &config.name),
        ("event", &config.event),
        ("type", &config.kind),
    ] {
        if values.is_empty() {
            continue;
        }
        let mut accepted = BTreeMap::new();
        for value in values {
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::InvalidFilter {
                    axis: axis.to_string(),
                    reason: "values must not be blank".to_string(),
                });
            }
            accepted.insert(value.to_string(), true);
        }
        query.insert(axis.to_string(), accepted);
    }
    let query = FilterQuery(query);
    // Surface encoding problems at startup rather than on first subscribe.
    query.to_json()?;
    Ok(query)
}
