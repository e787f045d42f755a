//! The main application logic, decoupled from the entry point.

use crate::{
    config::{Config, DockerConfig},
    core::{EventSource, NotificationTarget, Remediator},
    dispatch::{DispatchPool, Dispatcher},
    docker::DockerClient,
    event_loop::{EventLoop, LoopSummary, RemediationPolicy},
    filters::{self, FilterQuery},
    formatting::Renderer,
    notification::DingTalkTarget,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// A fully wired application, ready to subscribe and run.
pub struct App {
    config: Config,
    filter: FilterQuery,
    renderer: Renderer,
    event_source: Arc<dyn EventSource>,
    remediation: Option<RemediationPolicy>,
    dispatcher: Arc<Dispatcher>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Subscribes to the event stream and processes events until the stream
    /// ends, a fatal error occurs, or `shutdown_rx` fires. Queued
    /// notifications get the configured grace period before the process
    /// gives up on them.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> Result<LoopSummary> {
        let pool = DispatchPool::start(
            self.dispatcher.clone(),
            self.config.notify.workers,
            self.config.notify.queue_capacity,
        );

        let subscription = match self.event_source.subscribe(&self.filter).await {
            Ok(subscription) => subscription,
            Err(e) => {
                pool.shutdown(self.config.shutdown.grace_period()).await;
                return Err(e).context("failed to subscribe to container events");
            }
        };

        let event_loop = EventLoop::new(self.renderer, pool.handle(), self.remediation);
        let outcome = event_loop.run(subscription, shutdown_rx).await;

        let aborted = pool.shutdown(self.config.shutdown.grace_period()).await;
        if aborted > 0 {
            warn!(aborted, "Notifications still in flight at shutdown were discarded.");
        }

        let summary = outcome.context("container event stream failed")?;
        info!(exit = ?summary.exit, "Dockwatch stopped.");
        Ok(summary)
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// swap out the runtime and the notification targets.
pub struct AppBuilder {
    config: Config,
    event_source_override: Option<Arc<dyn EventSource>>,
    remediator_override: Option<Arc<dyn Remediator>>,
    targets_override: Option<Vec<Arc<dyn NotificationTarget>>>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            event_source_override: None,
            remediator_override: None,
            targets_override: None,
        }
    }

    /// Overrides the event source for testing.
    pub fn event_source_override(mut self, source: Arc<dyn EventSource>) -> Self {
        self.event_source_override = Some(source);
        self
    }

    /// Overrides the remediator for testing.
    pub fn remediator_override(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.remediator_override = Some(remediator);
        self
    }

    /// Overrides the notification targets for testing.
    pub fn targets_override(mut self, targets: Vec<Arc<dyn NotificationTarget>>) -> Self {
        self.targets_override = Some(targets);
        self
    }

    /// Validates the configuration and builds all components.
    #[instrument(skip_all)]
    pub fn build(self) -> Result<App> {
        let config = self.config;
        config.validate().context("invalid configuration")?;

        let filter = filters::build(&config.filters)?;
        debug!(filter = %filter.to_json()?, "Built event filter");

        let renderer = Renderer::new(
            config.render.offset()?,
            Some(config.render.footer.clone()),
            config.notify.mention_all,
        );

        let mut docker = None;
        let event_source: Arc<dyn EventSource> = match self.event_source_override {
            Some(source) => source,
            None => docker_client(&mut docker, &config.docker)? as Arc<dyn EventSource>,
        };

        let remediation = if config.remediation.enabled {
            let remediator: Arc<dyn Remediator> = match self.remediator_override {
                Some(remediator) => remediator,
                None => docker_client(&mut docker, &config.docker)? as Arc<dyn Remediator>,
            };
            Some(RemediationPolicy {
                remediator,
                restart_timeout: config.remediation.restart_timeout(),
                call_timeout: config.remediation.call_timeout(),
            })
        } else {
            None
        };

        let targets = match self.targets_override {
            Some(targets) => targets,
            None => {
                // Delivery attempts are bounded by the dispatcher alone.
                let http = reqwest::Client::builder()
                    .user_agent(concat!("dockwatch/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .context("failed to build webhook HTTP client")?;
                config
                    .notify
                    .urls
                    .iter()
                    .map(|url| {
                        Arc::new(DingTalkTarget::new(url.clone(), http.clone()))
                            as Arc<dyn NotificationTarget>
                    })
                    .collect()
            }
        };
        let dispatcher = Arc::new(Dispatcher::new(targets, config.notify.delivery_timeout()));

        info!(
            targets = dispatcher.target_count(),
            remediation = remediation.is_some(),
            "Dockwatch initialized."
        );

        Ok(App {
            config,
            filter,
            renderer,
            event_source,
            remediation,
            dispatcher,
        })
    }
}

/// Builds the Docker client on first use and shares it afterwards.
fn docker_client(
    cache: &mut Option<Arc<DockerClient>>,
    config: &DockerConfig,
) -> Result<Arc<DockerClient>> {
    if let Some(client) = cache {
        return Ok(client.clone());
    }
    let client = Arc::new(
        DockerClient::connect(config.endpoint()?, config.timeout())
            .context("failed to build Docker client")?,
    );
    info!(endpoint = %client.endpoint(), "Using Docker Engine API");
    *cache = Some(client.clone());
    Ok(client)
}
