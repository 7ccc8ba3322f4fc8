//! Configuration types for nogasm-ws

use crate::telemetry::LogFormat;
use crate::ws::{Endpoint, WsConfig, WsError};
use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Where to connect
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Origin of the device's web console; the socket URL derives from it
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Reconnect automatically after the connection is lost
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

fn default_origin() -> String {
    "http://nogasm.local".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            auto_reconnect: true,
        }
    }
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the reconnect delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Keepalive ping configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    /// Seconds between pings; 0 disables them
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl KeepaliveConfig {
    /// Ping interval, `None` when disabled
    pub fn interval(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.ping_interval_secs)).filter(|d| !d.is_zero())
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Connection manager settings derived from this config
    pub fn ws_config(&self) -> Result<WsConfig, WsError> {
        let endpoint = Endpoint::from_origin(&self.connection.origin)?;
        Ok(WsConfig::new(endpoint)
            .base_delay(Duration::from_millis(self.reconnect.base_delay_ms))
            .max_delay(Duration::from_millis(self.reconnect.max_delay_ms))
            .auto_reconnect(self.connection.auto_reconnect))
    }
}
