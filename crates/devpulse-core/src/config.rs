//! Layered configuration for the DevPulse services.
//!
//! Values resolve in three layers: compiled-in defaults, an optional TOML
//! file, then environment variable overrides.
//!
//! ```toml
//! [tcp]
//! listen = "0.0.0.0"   # Device ingestion listener
//! port = 2022
//!
//! [http]
//! listen = "0.0.0.0"   # REST API
//! port = 3000
//!
//! [storage]
//! path = "data/devpulse.redb"
//!
//! [liveness]
//! freshness_secs = 300
//! sweep_secs = 60
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable names recognized by [`Config::apply_env`].
pub mod env_vars {
    pub const TCP_PORT: &str = "DEVPULSE_TCP_PORT";
    pub const HTTP_PORT: &str = "DEVPULSE_HTTP_PORT";
    pub const DB_PATH: &str = "DEVPULSE_DB_PATH";
    /// Set to any value to emit logs as JSON lines.
    pub const LOG_JSON: &str = "DEVPULSE_LOG_JSON";
}

/// Full service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device ingestion (raw TCP) listener.
    #[serde(default)]
    pub tcp: TcpConfig,

    /// HTTP API listener.
    #[serde(default)]
    pub http: HttpConfig,

    /// Persistent storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Device liveness tracking.
    #[serde(default)]
    pub liveness: LivenessConfig,
}

/// TCP ingestion listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Listening address.
    #[serde(default = "default_listen_addr")]
    pub listen: String,

    /// Listening port.
    #[serde(default = "default_tcp_port")]
    pub port: u16,
}

/// HTTP API listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listening address.
    #[serde(default = "default_listen_addr")]
    pub listen: String,

    /// Listening port.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Liveness sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// How long since last contact a device still counts as active.
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,

    /// Period of the background staleness sweep.
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_tcp_port() -> u16 {
    2022
}

fn default_http_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "data/devpulse.redb".to_string()
}

fn default_freshness_secs() -> u64 {
    300
}

fn default_sweep_secs() -> u64 {
    60
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            port: default_tcp_port(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            port: default_http_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_freshness_secs(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

impl TcpConfig {
    /// Get the full socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.listen, self.port)
    }
}

impl HttpConfig {
    /// Get the full socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.listen, self.port)
    }
}

fn parse_addr(listen: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", listen, port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid address: {}", e)))
}

impl Config {
    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Apply environment variable overrides in place. Unparseable values
    /// are ignored in favor of the current setting.
    pub fn apply_env(&mut self) {
        if let Some(port) = env_u16(env_vars::TCP_PORT) {
            self.tcp.port = port;
        }
        if let Some(port) = env_u16(env_vars::HTTP_PORT) {
            self.http.port = port;
        }
        if let Ok(path) = std::env::var(env_vars::DB_PATH) {
            self.storage.path = path;
        }
    }
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
