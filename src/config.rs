use crate::tracker::error::TrackerError;
use crate::tracker::network::Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Snapshot file restored at startup and written on shutdown
    pub save_file: String,
    #[serde(default = "default_networks")]
    pub networks: Vec<Network>,
    #[serde(default = "default_ws_base")]
    pub ws_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_keepalive_timeout_secs")]
    pub keepalive_timeout_secs: u64,
    /// Only applied after a failed dial
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_confirmations")]
    pub default_confirmations: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_destination")]
    pub default_destination: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            default_destination: default_destination(),
        }
    }
}

fn default_networks() -> Vec<Network> {
    Network::ALL.to_vec()
}

fn default_ws_base() -> String {
    "wss://mempool.space".to_string()
}

fn default_api_base() -> String {
    "https://mempool.space".to_string()
}

fn default_keepalive_timeout_secs() -> u64 {
    120
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_retention_days() -> i64 {
    crate::tracker::snapshot::RETENTION_DAYS
}

fn default_confirmations() -> u32 {
    crate::tracker::model::DEFAULT_CONFIRMATIONS
}

fn default_destination() -> String {
    "#general".to_string()
}

impl TrackerConfig {
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, TrackerError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_file(path: &str) -> Result<Self, TrackerError> {
        let content = fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("Failed to read {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, TrackerError> {
        serde_yaml::from_str(content).map_err(|e| TrackerError::Config(e.to_string()))
    }
}
