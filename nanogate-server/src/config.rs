//! Gateway configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via NANOGATE_CONFIG); JSON files parse too
//! 3. Environment variables

use nanogate_ipc::pool::{DEFAULT_NODE_ADDRESS, DEFAULT_POOL_SIZE};
use nanogate_ipc::session::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_WRITE_TIMEOUT};
use nanogate_ipc::{Endpoint, PoolConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener configuration.
    pub http: HttpConfig,
    /// Node connection configuration.
    pub node: NodeConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("NANOGATE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.http.apply_env_overrides();
        self.node.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Checks values the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.node.validate()
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Largest accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_size: 1024 * 1024,
        }
    }
}

impl HttpConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("NANOGATE_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(size) = std::env::var("NANOGATE_MAX_BODY_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_body_size = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_size == 0 {
            return Err(ConfigError::Validation(
                "http.max_body_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Node connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node address, `tcp://host:port` or `local:///path`.
    pub connection: String,
    /// Number of persistent sessions.
    pub pool_size: usize,
    /// Dial timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-read and per-write deadline in seconds.
    pub read_write_timeout_secs: u64,
    /// Largest response length accepted from the node.
    pub max_response_size: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            connection: DEFAULT_NODE_ADDRESS.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            read_write_timeout_secs: DEFAULT_READ_WRITE_TIMEOUT.as_secs(),
            max_response_size: SessionConfig::default().max_response_size,
        }
    }
}

impl NodeConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(connection) = std::env::var("NANOGATE_NODE") {
            if !connection.is_empty() {
                self.connection = connection;
            }
        }

        if let Ok(size) = std::env::var("NANOGATE_POOL_SIZE") {
            if let Ok(n) = size.parse() {
                self.pool_size = n;
            }
        }

        if let Ok(timeout) = std::env::var("NANOGATE_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("NANOGATE_RW_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.read_write_timeout_secs = secs;
            }
        }

        if let Ok(size) = std::env::var("NANOGATE_MAX_RESPONSE_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_response_size = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Validation(
                "node.pool_size must be at least 1".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(ConfigError::Validation(
                "node.max_response_size must be greater than 0".to_string(),
            ));
        }
        Endpoint::parse(&self.connection).map_err(|e| {
            ConfigError::Validation(format!(
                "node.connection '{}': {}",
                self.connection,
                e.message()
            ))
        })?;
        Ok(())
    }

    /// Returns the connect timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the read/write timeout as Duration.
    pub fn read_write_timeout(&self) -> Duration {
        Duration::from_secs(self.read_write_timeout_secs)
    }

    /// Builds the session pool configuration. Zero timeouts fall back to defaults.
    pub fn pool_config(&self) -> PoolConfig {
        let session = SessionConfig::new()
            .with_connect_timeout(self.connect_timeout())
            .with_read_write_timeout(self.read_write_timeout())
            .with_max_response_size(self.max_response_size);
        PoolConfig::new(self.connection.clone(), self.pool_size).with_session_config(session)
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("NANOGATE_METRICS_ENABLED") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
        if let Ok(addr) = std::env::var("NANOGATE_METRICS_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
