use dockwatch::app::App;
use dockwatch::event_loop::ExitReason;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{
    mock_remediator::MockRemediator,
    mock_source::MockEventSource,
    mock_target::{FailingTarget, RecordingTarget},
    test_config, web_event, CONTAINER_ID,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_app_relays_events_until_end_of_stream() {
    let (source, feed) = MockEventSource::new();
    let source = Arc::new(source);
    let target = RecordingTarget::new("recorder");

    let mut config = test_config();
    config.filters.name = vec!["web-1".to_string()];
    let app = App::builder(config)
        .event_source_override(source.clone())
        .targets_override(vec![
            Arc::new(target.clone()),
            Arc::new(FailingTarget { code: 300001 }),
        ])
        .build()
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_handle = tokio::spawn(app.run(shutdown_rx));

    feed.send(web_event("health_status: unhealthy")).await;
    feed.send(web_event("health_status: healthy")).await;
    feed.end().await;

    let summary = tokio::time::timeout(WAIT, app_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.exit, ExitReason::EndOfStream);
    assert_eq!(summary.stats.events, 2);
    assert_eq!(summary.stats.restarts, 0);

    let titles: Vec<String> = target.messages().into_iter().map(|m| m.title).collect();
    assert_eq!(titles.len(), 2);

    let filter = source.last_filter.lock().unwrap().clone().unwrap();
    assert_eq!(filter.values("name"), Some(vec!["web-1"]));
}

#[tokio::test]
async fn test_app_restarts_unhealthy_containers_when_enabled() {
    let (source, feed) = MockEventSource::new();
    let remediator = MockRemediator::default();

    let mut config = test_config();
    config.remediation.enabled = true;
    let app = App::builder(config)
        .event_source_override(Arc::new(source))
        .remediator_override(Arc::new(remediator.clone()))
        .targets_override(vec![Arc::new(RecordingTarget::new("recorder"))])
        .build()
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_handle = tokio::spawn(app.run(shutdown_rx));

    feed.send(web_event("health_status: unhealthy")).await;
    feed.end().await;

    let summary = tokio::time::timeout(WAIT, app_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.stats.restarts, 1);
    assert_eq!(
        remediator.calls(),
        vec![(CONTAINER_ID.to_string(), Duration::from_secs(3))]
    );
}

#[tokio::test]
async fn test_app_ignores_remediator_when_disabled() {
    let (source, feed) = MockEventSource::new();
    let remediator = MockRemediator::default();

    let app = App::builder(test_config())
        .event_source_override(Arc::new(source))
        .remediator_override(Arc::new(remediator.clone()))
        .targets_override(vec![Arc::new(RecordingTarget::new("recorder"))])
        .build()
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_handle = tokio::spawn(app.run(shutdown_rx));

    feed.send(web_event("health_status: unhealthy")).await;
    feed.end().await;

    tokio::time::timeout(WAIT, app_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(remediator.calls().is_empty());
}

#[tokio::test]
async fn test_app_fails_when_subscription_is_refused() {
    let app = App::builder(test_config())
        .event_source_override(Arc::new(MockEventSource::refusing()))
        .targets_override(vec![Arc::new(RecordingTarget::new("recorder"))])
        .build()
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = tokio::time::timeout(WAIT, app.run(shutdown_rx)).await.unwrap();

    let err = result.unwrap_err();
    assert!(
        err.to_string().contains("failed to subscribe"),
        "Error message did not contain expected text: '{}'",
        err
    );
    assert!(format!("{:#}", err).contains("daemon unavailable"));
}

#[tokio::test]
async fn test_app_shuts_down_on_signal() {
    let (source, _feed) = MockEventSource::new();
    let app = App::builder(test_config())
        .event_source_override(Arc::new(source))
        .targets_override(vec![Arc::new(RecordingTarget::new("recorder"))])
        .build()
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_handle = tokio::spawn(app.run(shutdown_rx));
    shutdown_tx.send(true).unwrap();

    let summary = tokio::time::timeout(WAIT, app_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.exit, ExitReason::Shutdown);
}

#[test]
fn test_build_rejects_invalid_config() {
    let result = App::builder(dockwatch::config::Config::default()).build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_build_with_real_clients() {
    // Building does not contact the daemon or the webhooks.
    let mut config = test_config();
    config.docker.host = "tcp://127.0.0.1:2375".to_string();
    config.remediation.enabled = true;
    assert!(App::builder(config).build().is_ok());
}
