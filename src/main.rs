//! Dockwatch - Container Health Notifier
//!
//! Watches the Docker event stream and relays health transitions to chat
//! webhooks, optionally restarting containers that turn unhealthy.

use clap::Parser;
use dockwatch::{app::App, cli::Cli, config::Config};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            init_tracing("info");
            error!("Failed to load configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.core.log_level);

    info!("Dockwatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.core.log_level);
    info!(
        "Docker Endpoint: {}",
        config
            .docker
            .endpoint()
            .map(|endpoint| endpoint.to_string())
            .unwrap_or_else(|_| config.docker.host.clone())
    );
    info!("Notification Targets: {}", config.notify.urls.len());
    info!("Dispatch Workers: {}", config.notify.workers);
    info!("Dispatch Queue Capacity: {}", config.notify.queue_capacity);
    info!("Delivery Timeout: {}ms", config.notify.delivery_timeout_ms);
    info!("Filter (name): {:?}", config.filters.name);
    info!("Filter (event): {:?}", config.filters.event);
    info!("Filter (type): {:?}", config.filters.kind);
    info!(
        "Remediation: {}",
        if config.remediation.enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("-------------------------------------------------------");

    let app = match App::builder(config).build() {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_task = tokio::spawn(app.run(shutdown_rx));

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received. Shutting down gracefully...");
        let _ = shutdown_tx.send(true);
    });

    match app_task.await {
        Ok(Ok(_summary)) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("Terminating: {:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Event loop task panicked: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
