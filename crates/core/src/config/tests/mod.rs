use crate::config::models::AppConfig;
use crate::models::WorkerStatus;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.sandbox.port, 8090);
    assert_eq!(config.health_monitor.poll_interval_seconds, 30);
    assert_eq!(config.health_monitor.failure_threshold, 3);
    assert_eq!(config.task_tracker.poll_interval_seconds, 30);
    assert_eq!(config.backlog.submission_ttl_seconds, Some(3600));
    assert_eq!(config.dispatcher.strategy, "tier_ranked");
    assert!(config.fleet.workers.is_empty());
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[[fleet.workers]]
name = "cuckoo-01"
host = "10.0.0.11"

[[fleet.workers]]
name = "cuckoo-02"
host = "10.0.0.12"
status = "inactive"

[sandbox]
port = 9090
request_timeout_seconds = 5

[health_monitor]
poll_interval_seconds = 15
failure_threshold = 5

[backlog]
submission_ttl_seconds = 600
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.fleet.workers.len(), 2);
    assert_eq!(config.fleet.workers[0].status, WorkerStatus::Active);
    assert_eq!(config.fleet.workers[1].status, WorkerStatus::Inactive);
    assert_eq!(config.sandbox.port, 9090);
    assert_eq!(config.sandbox.request_timeout_seconds, 5);
    // 未出现的字段取默认值
    assert_eq!(config.sandbox.submit_timeout_seconds, 60);
    assert_eq!(config.health_monitor.failure_threshold, 5);
    assert_eq!(config.backlog.submission_ttl_seconds, Some(600));
}

#[test]
fn test_toml_round_trip() {
    let mut config = AppConfig::default();
    config.health_monitor.poll_interval_seconds = 45;

    let toml_str = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(parsed.health_monitor.poll_interval_seconds, 45);
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut config = AppConfig::default();
    config.health_monitor.poll_interval_seconds = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.task_tracker.failure_threshold = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.dispatcher.strategy = "round_robin".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.sandbox.scheme = "ftp".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.metrics_enabled = true;
    config.observability.metrics_bind_address = "not-an-address".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_duplicate_worker_names_are_rejected() {
    let toml_content = r#"
[[fleet.workers]]
name = "cuckoo-01"
host = "10.0.0.11"

[[fleet.workers]]
name = "cuckoo-01"
host = "10.0.0.12"
"#;

    assert!(AppConfig::from_toml(toml_content).is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[[fleet.workers]]
name = "cuckoo-07"
host = "192.168.1.7"

[sandbox]
port = 8091
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap();
    let config = AppConfig::load(Some(path)).unwrap();
    assert_eq!(config.fleet.workers.len(), 1);
    assert_eq!(config.fleet.workers[0].name, "cuckoo-07");
    assert_eq!(config.sandbox.port, 8091);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(AppConfig::load(Some("/nonexistent/fleet.toml")).is_err());
}

#[test]
fn test_config_environment_override() {
    std::env::set_var("FLEET_TASK_TRACKER__POLL_INTERVAL_SECONDS", "12");

    let config = AppConfig::load(None).unwrap();
    assert_eq!(config.task_tracker.poll_interval_seconds, 12);

    std::env::remove_var("FLEET_TASK_TRACKER__POLL_INTERVAL_SECONDS");
}
