//! Configuration management
//!
//! Layers, later wins: built-in defaults, `config/transfer.toml` (or the file
//! named by `TRANSFER_CONFIG`), `TRANSFER__SECTION__KEY` environment
//! variables, then the flat `AMI_*`, `TRANSFER_API_KEY` and `PORT` variables.

use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "config/transfer.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ami: AmiConfig,
    pub transfer: TransferConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

/// Login mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmiAuth {
    /// `Login` with `Secret`
    Plain,
    /// `Challenge` then `Login` with an MD5 key
    Md5,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmiConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub auth: AmiAuth,
    pub connect_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Zero disables keep-alive pings
    pub ping_interval_secs: u64,
    pub event_capacity: usize,
}

impl AmiConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5038,
            username: "admin".to_string(),
            secret: "admin".to_string(),
            auth: AmiAuth::Plain,
            connect_timeout_ms: 5_000,
            action_timeout_ms: 5_000,
            reconnect_delay_ms: 3_000,
            ping_interval_secs: 30,
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Upper bound on waiting for a channel dump to complete
    pub collection_window_ms: u64,
    pub default_context: String,
    pub default_priority: u32,
    /// Channel technologies an extension may be registered with
    pub technologies: Vec<String>,
}

impl TransferConfig {
    pub fn collection_window(&self) -> Duration {
        Duration::from_millis(self.collection_window_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            collection_window_ms: 800,
            default_context: "default".to_string(),
            default_priority: 1,
            technologies: vec!["PJSIP".to_string(), "SIP".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Shared secret expected in `x-api-key`. Empty rejects every request.
    pub api_key: String,
}

impl Config {
    /// Load configuration from file and process environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("TRANSFER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::load_from(&path)?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults, then `path` if it exists, then `TRANSFER__*` variables
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("TRANSFER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("transfer.technologies")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Flat variables kept for deployments that predate the layered config
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("AMI_HOST") {
            self.ami.host = host;
        }
        if let Some(port) = lookup("AMI_PORT").and_then(|p| p.parse().ok()) {
            self.ami.port = port;
        }
        if let Some(user) = lookup("AMI_USER") {
            self.ami.username = user;
        }
        if let Some(secret) = lookup("AMI_PASSWORD") {
            self.ami.secret = secret;
        }
        if let Some(key) = lookup("TRANSFER_API_KEY") {
            self.api.api_key = key;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}
