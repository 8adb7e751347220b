use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitoring.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Storage configuration (defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Broker connection (absent = no message bus)
    pub mqtt: Option<MqttConfig>,

    #[serde(default)]
    pub api: ApiSettings,

    /// Hosts registered at startup if their address is not yet in the inventory
    pub hosts: Option<Vec<HostSeed>>,
}

/// Polling loop tuning
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polling cycles
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Consecutive failed probes before an UP host is declared DOWN
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Overall bound on a single host probe, in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Upper bound on probes in flight during one cycle
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// TCP ports tried, in order, when ICMP does not answer
    #[serde(default = "default_tcp_ports")]
    pub tcp_ports: Vec<u16>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            failure_threshold: default_failure_threshold(),
            probe_timeout: default_probe_timeout(),
            max_concurrent_probes: default_max_concurrent_probes(),
            tcp_ports: default_tcp_ports(),
        }
    }
}

impl MonitorConfig {
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// Budget for each network tactic
    ///
    /// ICMP and TCP each get half of the probe bound. TCP splits its half
    /// across `tcp_ports`, so every configured port is tried in time.
    pub fn attempt_timeout_duration(&self) -> Duration {
        (self.probe_timeout_duration() / 2).max(Duration::from_millis(100))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval == 0 {
            bail!("monitor.interval must be greater than 0");
        }
        if self.failure_threshold == 0 {
            bail!("monitor.failure_threshold must be at least 1");
        }
        if self.probe_timeout == 0 {
            bail!("monitor.probe_timeout must be greater than 0");
        }
        if self.probe_timeout >= self.interval {
            bail!(
                "monitor.probe_timeout ({}s) must be shorter than monitor.interval ({}s)",
                self.probe_timeout,
                self.interval
            );
        }
        if self.max_concurrent_probes == 0 {
            bail!("monitor.max_concurrent_probes must be at least 1");
        }
        Ok(())
    }
}

fn default_interval() -> u64 {
    8
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_max_concurrent_probes() -> usize {
    32
}

fn default_tcp_ports() -> Vec<u16> {
    vec![80, 443]
}

/// Message bus connection and topics
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,

    /// Topic this process publishes its own alert events on
    #[serde(default = "default_publish_topic")]
    pub publish_topic: String,

    /// Topic external sensors publish their events on
    #[serde(default = "default_subscribe_topic")]
    pub subscribe_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            keep_alive: default_keep_alive(),
            publish_topic: default_publish_topic(),
            subscribe_topic: default_subscribe_topic(),
        }
    }
}

fn default_mqtt_host() -> String {
    "test.mosquitto.org".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "host-monitoring".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_publish_topic() -> String {
    "monitoring/events".to_string()
}

fn default_subscribe_topic() -> String {
    "monitoring/alerts".to_string()
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct HostSeed {
    pub name: String,
    pub address: String,
}

impl Config {
    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    /// Apply environment overrides on top of the file contents
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = util::get_db_path() {
            self.storage = Some(StorageConfig::Sqlite { path });
        }

        if let Some(host) = util::get_mqtt_broker() {
            self.mqtt.get_or_insert_with(MqttConfig::default).host = host;
        }

        if let Some(port) = util::get_mqtt_port()
            && let Some(mqtt) = self.mqtt.as_mut()
        {
            mqtt.port = port;
        }

        if let Some(addr) = util::get_api_addr() {
            self.api.bind_addr = addr;
        }

        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.monitor.validate()
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {path}"))?;
    parse_config(&file_content)
}
