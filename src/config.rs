// src/config.rs

//! Manages configuration for both the nexus server and the minion agent:
//! loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9878
}

/// Settings for the command store: per-operation deadline and the retry
/// policy applied to transient persistence failures.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file. Parent directories are created on demand.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Deadline for a single store operation.
    #[serde(with = "humantime_serde", default = "default_store_op_timeout")]
    pub op_timeout: Duration,
    /// How many times a transient failure is retried before surfacing.
    #[serde(default = "default_store_max_retries")]
    pub max_retries: u32,
    /// Base unit for the quadratic retry backoff (attempt² × base).
    #[serde(with = "humantime_serde", default = "default_store_retry_base")]
    pub retry_base_delay: Duration,
}

fn default_database_path() -> String {
    "hivelink_data/hivelink.db".to_string()
}
fn default_store_op_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_store_max_retries() -> u32 {
    3
}
fn default_store_retry_base() -> Duration {
    Duration::from_millis(1)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            op_timeout: default_store_op_timeout(),
            max_retries: default_store_max_retries(),
            retry_base_delay: default_store_retry_base(),
        }
    }
}

/// Represents the validated nexus server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Capacity of each minion's outbound command queue.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Deadline for placing one command onto one minion's queue.
    #[serde(with = "humantime_serde", default = "default_enqueue_timeout")]
    pub enqueue_timeout: Duration,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7676
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_channel_capacity() -> usize {
    100
}
fn default_enqueue_timeout() -> Duration {
    Duration::from_millis(100)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            channel_capacity: default_channel_capacity(),
            enqueue_timeout: default_enqueue_timeout(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.channel_capacity == 0 {
            return Err(anyhow!("channel_capacity must be at least 1"));
        }
        if self.enqueue_timeout.is_zero() {
            return Err(anyhow!("enqueue_timeout cannot be zero"));
        }
        if self.store.database_path.trim().is_empty() {
            return Err(anyhow!("store.database_path cannot be empty"));
        }
        Ok(())
    }
}

/// Knobs for the minion's exponential-backoff reconnection strategy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReconnectConfig {
    #[serde(with = "humantime_serde", default = "default_reconnect_initial")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_reconnect_max")]
    pub max_delay: Duration,
    #[serde(default = "default_reconnect_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter_enabled")]
    pub jitter: bool,
}

fn default_reconnect_initial() -> Duration {
    Duration::from_secs(1)
}
fn default_reconnect_max() -> Duration {
    Duration::from_secs(3600)
}
fn default_reconnect_multiplier() -> f64 {
    2.0
}
fn default_jitter_enabled() -> bool {
    true
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_reconnect_initial(),
            max_delay: default_reconnect_max(),
            multiplier: default_reconnect_multiplier(),
            jitter: default_jitter_enabled(),
        }
    }
}

/// Represents the validated minion agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinionConfig {
    /// Address of the nexus, as `host:port`.
    #[serde(default = "default_nexus_addr")]
    pub nexus_addr: String,
    /// A fixed minion identifier. When absent the nexus assigns one at
    /// registration and the minion adopts it.
    #[serde(default)]
    pub id: Option<String>,
    /// Static tags announced with every registration.
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    /// How often host info is re-announced to the nexus.
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,
    /// Deadline for one shell command execution.
    #[serde(with = "humantime_serde", default = "default_shell_timeout")]
    pub shell_timeout: Duration,
    /// Number of initial registration attempts before giving up.
    #[serde(default = "default_registration_attempts")]
    pub registration_attempts: u32,
    /// Deadline for the stream handshake (hello sent, ready received).
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,
    /// Pause between processing cycles after the stream goes down.
    #[serde(with = "humantime_serde", default = "default_retry_interval")]
    pub retry_interval: Duration,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_nexus_addr() -> String {
    "127.0.0.1:7676".to_string()
}
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_shell_timeout() -> Duration {
    Duration::from_secs(15)
}
fn default_registration_attempts() -> u32 {
    5
}
fn default_handshake_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for MinionConfig {
    fn default() -> Self {
        Self {
            nexus_addr: default_nexus_addr(),
            id: None,
            tags: IndexMap::new(),
            heartbeat_interval: default_heartbeat_interval(),
            shell_timeout: default_shell_timeout(),
            registration_attempts: default_registration_attempts(),
            handshake_timeout: default_handshake_timeout(),
            retry_interval: default_retry_interval(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl MinionConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: MinionConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nexus_addr.trim().is_empty() {
            return Err(anyhow!("nexus_addr cannot be empty"));
        }
        if let Some(id) = &self.id
            && id.trim().is_empty()
        {
            return Err(anyhow!("id, when set, cannot be empty"));
        }
        if self.registration_attempts == 0 {
            return Err(anyhow!("registration_attempts must be at least 1"));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(anyhow!("reconnect.multiplier must be >= 1.0"));
        }
        if self.reconnect.initial_delay.is_zero() {
            return Err(anyhow!("reconnect.initial_delay cannot be zero"));
        }
        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(anyhow!("reconnect.max_delay must be >= initial_delay"));
        }
        Ok(())
    }
}
