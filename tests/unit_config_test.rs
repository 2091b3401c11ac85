use hivelink::config::{Config, MinionConfig};
use std::time::Duration;

#[test]
fn test_nexus_config_defaults() {
    let config: Config = toml::from_str("").unwrap();
    config.validate().unwrap();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 7676);
    assert_eq!(config.channel_capacity, 100);
    assert_eq!(config.enqueue_timeout, Duration::from_millis(100));
    assert_eq!(config.store.op_timeout, Duration::from_secs(5));
    assert_eq!(config.store.max_retries, 3);
    assert!(!config.metrics.enabled);
}

#[test]
fn test_nexus_config_overrides() {
    let config: Config = toml::from_str(
        r#"
        host = "0.0.0.0"
        port = 9000
        enqueue_timeout = "250ms"

        [store]
        database_path = "/tmp/hl-test.db"
        op_timeout = "2s"

        [metrics]
        enabled = true
        port = 9999
        "#,
    )
    .unwrap();
    config.validate().unwrap();

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 9000);
    assert_eq!(config.enqueue_timeout, Duration::from_millis(250));
    assert_eq!(config.store.database_path, "/tmp/hl-test.db");
    assert_eq!(config.store.op_timeout, Duration::from_secs(2));
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9999);
}

#[test]
fn test_nexus_config_rejects_port_zero() {
    let config: Config = toml::from_str("port = 0").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_nexus_config_rejects_zero_capacity() {
    let config: Config = toml::from_str("channel_capacity = 0").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_minion_config_defaults() {
    let config: MinionConfig = toml::from_str("").unwrap();
    config.validate().unwrap();

    assert_eq!(config.nexus_addr, "127.0.0.1:7676");
    assert!(config.id.is_none());
    assert!(config.tags.is_empty());
    assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    assert_eq!(config.shell_timeout, Duration::from_secs(15));
    assert_eq!(config.registration_attempts, 5);
    assert_eq!(config.retry_interval, Duration::from_secs(1));
    assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
    assert_eq!(config.reconnect.max_delay, Duration::from_secs(3600));
    assert!(config.reconnect.jitter);
}

#[test]
fn test_minion_config_with_tags_and_durations() {
    let config: MinionConfig = toml::from_str(
        r#"
        nexus_addr = "nexus.internal:7676"
        id = "edge-worker-7"
        heartbeat_interval = "10s"
        shell_timeout = "1m"

        [tags]
        env = "prod"
        zone = "eu-1"

        [reconnect]
        initial_delay = "500ms"
        max_delay = "30s"
        multiplier = 1.5
        jitter = false
        "#,
    )
    .unwrap();
    config.validate().unwrap();

    assert_eq!(config.id.as_deref(), Some("edge-worker-7"));
    assert_eq!(config.tags.get("env"), Some(&"prod".to_string()));
    assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    assert_eq!(config.shell_timeout, Duration::from_secs(60));
    assert_eq!(config.reconnect.initial_delay, Duration::from_millis(500));
    assert!(!config.reconnect.jitter);
}

#[test]
fn test_minion_config_rejects_bad_reconnect() {
    let config: MinionConfig = toml::from_str(
        r#"
        [reconnect]
        initial_delay = "10s"
        max_delay = "1s"
        "#,
    )
    .unwrap();
    assert!(config.validate().is_err());

    let config: MinionConfig = toml::from_str(
        r#"
        [reconnect]
        multiplier = 0.5
        "#,
    )
    .unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_minion_config_rejects_empty_nexus_addr() {
    let config: MinionConfig = toml::from_str(r#"nexus_addr = """#).unwrap();
    assert!(config.validate().is_err());
}
