//! Configuration management for Dockwatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `dockwatch.toml` file, `DOCKWATCH_`-prefixed
//! environment variables and command-line arguments.

use crate::cli::Cli;
use crate::docker::DockerEndpoint;
use crate::filters::EventFilterConfig;
use chrono::FixedOffset;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file read when `--config` is not given. Optional.
pub const DEFAULT_CONFIG_FILE: &str = "dockwatch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("config file not found at specified path: {0}")]
    FileNotFound(PathBuf),

    #[error("notify.urls must contain at least one webhook URL")]
    MissingTargets,

    #[error("invalid webhook URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid docker.host {0:?}")]
    InvalidDockerHost(String),

    #[error("invalid filter value on axis {axis:?}: {reason}")]
    InvalidFilter { axis: String, reason: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("render.utc_offset_seconds {0} is out of range")]
    InvalidOffset(i32),

    #[error("failed to encode filter query: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    /// Include-lists applied to the event subscription.
    #[serde(default)]
    pub filters: EventFilterConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Default log filter; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Where to reach the Docker Engine API.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DockerConfig {
    /// `unix:///path`, `tcp://host:port` or `http://host:port`. Empty means
    /// `DOCKER_HOST`, falling back to the local socket.
    pub host: String,
    /// Upper bound on each request to the daemon.
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_secs: 120,
        }
    }
}

/// Notification targets and dispatch limits.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook URLs; at least one is required.
    pub urls: Vec<String>,
    /// Ask the chat platform to notify everyone.
    pub mention_all: bool,
    /// Upper bound on a single delivery attempt.
    pub delivery_timeout_ms: u64,
    /// Number of dispatch workers.
    pub workers: usize,
    /// Notifications waiting for a worker before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            urls: vec![],
            mention_all: true,
            delivery_timeout_ms: 5_000,
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Automatic restarts of unhealthy containers.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RemediationConfig {
    pub enabled: bool,
    /// Stop timeout handed to the runtime with the restart request.
    pub restart_timeout_secs: u64,
    /// Upper bound on the restart request itself.
    pub call_timeout_secs: u64,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            restart_timeout_secs: 3,
            call_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Timezone for rendered timestamps, as seconds east of UTC.
    pub utc_offset_seconds: i32,
    /// Appended to the publication line of every message when non-empty.
    pub footer: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time given to queued and in-flight notifications on shutdown.
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
        }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the config file, the
    /// environment and the command line, then validates it.
    ///
    /// An explicitly requested config file must exist; the default one is
    /// optional.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = match &cli.config {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => path.clone(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        let config = Self::figment(&path)
            .merge(cli.clone())
            .extract::<Config>()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// The layered sources without the command line.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // e.g. DOCKWATCH_NOTIFY__URLS='["https://..."]'
            .merge(Env::prefixed("DOCKWATCH_").split("__"))
    }

    /// Fails fast on configuration the process cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notify.urls.is_empty() {
            return Err(ConfigError::MissingTargets);
        }
        for url in &self.notify.urls {
            let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl {
                    url: url.clone(),
                    reason: format!("unsupported scheme {:?}", parsed.scheme()),
                });
            }
        }

        self.docker.endpoint()?;
        if self.docker.timeout_secs == 0 {
            return Err(ConfigError::Zero("docker.timeout_secs"));
        }

        if self.notify.workers == 0 {
            return Err(ConfigError::Zero("notify.workers"));
        }
        if self.notify.queue_capacity == 0 {
            return Err(ConfigError::Zero("notify.queue_capacity"));
        }
        if self.notify.delivery_timeout_ms == 0 {
            return Err(ConfigError::Zero("notify.delivery_timeout_ms"));
        }
        if self.remediation.call_timeout_secs == 0 {
            return Err(ConfigError::Zero("remediation.call_timeout_secs"));
        }

        self.render.offset()?;
        crate::filters::build(&self.filters)?;
        Ok(())
    }
}

impl NotifyConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl RemediationConfig {
    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl RenderConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_seconds)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_seconds))
    }
}

impl DockerConfig {
    pub fn endpoint(&self) -> Result<DockerEndpoint, ConfigError> {
        DockerEndpoint::parse(&self.host)
            .ok_or_else(|| ConfigError::InvalidDockerHost(self.host.clone()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
