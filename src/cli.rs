//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `dockwatch.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Relays container health events to chat webhooks.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level filter (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Docker daemon, e.g. unix:///var/run/docker.sock or tcp://127.0.0.1:2375.
    /// Defaults to DOCKER_HOST, then the local socket.
    #[arg(long, value_name = "URL")]
    pub docker_host: Option<String>,

    /// Webhook URL to notify. May be repeated; replaces configured URLs.
    #[arg(long = "notify-url", value_name = "URL")]
    pub notify_urls: Vec<String>,

    /// Restart containers that turn unhealthy.
    #[arg(long)]
    pub remediate: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            insert_nested(&mut dict, "core", "log_level", Value::from(level.clone()));
        }

        if let Some(host) = &self.docker_host {
            insert_nested(&mut dict, "docker", "host", Value::from(host.clone()));
        }

        if !self.notify_urls.is_empty() {
            let urls = self
                .notify_urls
                .iter()
                .map(|url| Value::from(url.clone()))
                .collect();
            insert_nested(&mut dict, "notify", "urls", Value::Array(Tag::Default, urls));
        }

        // Only an explicit flag turns remediation on; its absence leaves the
        // configured value alone.
        if self.remediate {
            insert_nested(&mut dict, "remediation", "enabled", Value::from(true));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

fn insert_nested(dict: &mut Dict, section: &str, key: &str, value: Value) {
    let entry = dict
        .entry(section.to_string())
        .or_insert_with(|| Value::Dict(Tag::Default, Dict::new()));
    if let Value::Dict(_, inner) = entry {
        inner.insert(key.to_string(), value);
    }
}
