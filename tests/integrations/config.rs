use clap::Parser;
use dockwatch::cli::Cli;
use dockwatch::config::{Config, ConfigError};
use dockwatch::docker::DockerEndpoint;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

fn cli_for(path: PathBuf) -> Cli {
    Cli {
        config: Some(path),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r#"
        [core]
        log_level = "debug"
        [docker]
        host = "tcp://10.0.0.5:2375"
        timeout_secs = 30
        [filters]
        name = ["web-1", "web-2"]
        event = ["health_status"]
        type = ["container"]
        [notify]
        urls = ["https://oapi.dingtalk.com/robot/send?access_token=a"]
        mention_all = false
        delivery_timeout_ms = 2000
        workers = 2
        queue_capacity = 32
        [remediation]
        enabled = true
        restart_timeout_secs = 5
        call_timeout_secs = 20
        [render]
        utc_offset_seconds = 28800
        footer = "ops-bot"
        [shutdown]
        grace_period_ms = 750
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli_for(path)).unwrap();
        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.docker.host, "tcp://10.0.0.5:2375");
        assert_eq!(config.docker.timeout_secs, 30);
        assert_eq!(config.filters.name, vec!["web-1", "web-2"]);
        assert_eq!(config.filters.kind, vec!["container"]);
        assert!(!config.notify.mention_all);
        assert_eq!(config.notify.workers, 2);
        assert_eq!(config.notify.queue_capacity, 32);
        assert!(config.remediation.enabled);
        assert_eq!(config.remediation.restart_timeout_secs, 5);
        assert_eq!(config.render.utc_offset_seconds, 28800);
        assert_eq!(config.render.footer, "ops-bot");
        assert_eq!(config.shutdown.grace_period_ms, 750);
    });
}

#[test]
#[serial]
fn test_partial_config_keeps_defaults() {
    let toml_content = r#"
        [notify]
        urls = ["https://hooks.example.com/a"]
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli_for(path)).unwrap();
        assert_eq!(config.core.log_level, "info");
        assert!(config.docker.host.is_empty());
        assert_eq!(config.docker.endpoint().unwrap(), DockerEndpoint::Defaults);
        assert_eq!(config.docker.timeout_secs, 120);
        assert_eq!(config.notify.workers, 4);
        assert_eq!(config.notify.queue_capacity, 256);
        assert_eq!(config.notify.delivery_timeout_ms, 5000);
        assert!(config.notify.mention_all);
        assert!(!config.remediation.enabled);
        assert!(config.filters.event.is_empty());
    });
}

#[test]
#[serial]
fn test_missing_urls_fail_fast() {
    with_config_file("[core]\nlog_level = \"warn\"\n", |path| {
        let result = Config::load(&cli_for(path));
        assert!(matches!(result, Err(ConfigError::MissingTargets)));
    });
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    let cli = cli_for(PathBuf::from("/nonexistent/dockwatch.toml"));
    assert!(matches!(
        Config::load(&cli),
        Err(ConfigError::FileNotFound(_))
    ));
}

#[test]
#[serial]
fn test_malformed_file_is_a_load_error() {
    with_config_file("[notify\nurls = ", |path| {
        assert!(matches!(
            Config::load(&cli_for(path)),
            Err(ConfigError::Load(_))
        ));
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let toml_content = r#"
        [notify]
        urls = ["https://hooks.example.com/a"]
        workers = 2
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("DOCKWATCH_NOTIFY__WORKERS", "8");
        std::env::set_var("DOCKWATCH_REMEDIATION__ENABLED", "true");
        let result = Config::load(&cli_for(path));
        std::env::remove_var("DOCKWATCH_NOTIFY__WORKERS");
        std::env::remove_var("DOCKWATCH_REMEDIATION__ENABLED");

        let config = result.unwrap();
        assert_eq!(config.notify.workers, 8);
        assert!(config.remediation.enabled);
    });
}

#[test]
#[serial]
fn test_cli_overrides_file_and_environment() {
    let toml_content = r#"
        [core]
        log_level = "warn"
        [docker]
        host = "http://file-host:2375"
        [notify]
        urls = ["https://hooks.example.com/from-file"]
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("DOCKWATCH_DOCKER__HOST", "http://env-host:2375");
        let cli = Cli::try_parse_from([
            "dockwatch",
            "--config",
            path.to_str().unwrap(),
            "--log-level",
            "trace",
            "--docker-host",
            "tcp://cli-host:2375",
            "--notify-url",
            "https://hooks.example.com/from-cli",
            "--remediate",
        ])
        .unwrap();
        let result = Config::load(&cli);
        std::env::remove_var("DOCKWATCH_DOCKER__HOST");

        let config = result.unwrap();
        assert_eq!(config.core.log_level, "trace");
        assert_eq!(config.docker.host, "tcp://cli-host:2375");
        assert_eq!(config.notify.urls, vec!["https://hooks.example.com/from-cli"]);
        assert!(config.remediation.enabled);
    });
}

#[test]
#[serial]
fn test_invalid_docker_host_is_rejected() {
    let toml_content = r#"
        [docker]
        host = "ssh://admin@docker.internal"
        [notify]
        urls = ["https://hooks.example.com/a"]
    "#;

    with_config_file(toml_content, |path| {
        assert!(matches!(
            Config::load(&cli_for(path)),
            Err(ConfigError::InvalidDockerHost(_))
        ));
    });
}

#[cfg(unix)]
#[test]
#[serial]
fn test_unix_socket_docker_host_is_accepted() {
    let toml_content = r#"
        [docker]
        host = "unix:///var/run/docker.sock"
        [notify]
        urls = ["https://hooks.example.com/a"]
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli_for(path)).unwrap();
        assert_eq!(
            config.docker.endpoint().unwrap(),
            DockerEndpoint::Unix("/var/run/docker.sock".to_string())
        );
    });
}
