//! Configuration management for the session server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use session_hub::config::{
    DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_MAX_CONNECTIONS_PER_IP, DEFAULT_MAX_REQUEST_SIZE,
    DEFAULT_QUEUE_CAPACITY,
};
use session_hub::ServerConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML file.
///
/// Every section and field is optional in the file; missing values take the
/// hub's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Identity store settings
    pub identity: IdentitySettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Network binding and per-client limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Sessions allowed per client address
    pub max_connections_per_ip: usize,
    /// Bound of every client's inbound and outbound queue
    pub queue_capacity: usize,
    /// Largest accepted inbound buffer in bytes
    pub max_request_size: usize,
    /// Player-count broadcast interval in milliseconds
    pub broadcast_interval_ms: u64,
    /// Take client addresses from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections_per_ip: DEFAULT_MAX_CONNECTIONS_PER_IP,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            trust_forwarded_for: false,
        }
    }
}

/// Identity store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// JSON file of accounts to seed the in-memory store with
    pub accounts_file: Option<String>,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// that path and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Path of the accounts seed file, if one is configured.
    pub fn accounts_file(&self) -> Option<PathBuf> {
        self.identity.accounts_file.as_ref().map(PathBuf::from)
    }

    /// Converts the application configuration to the hub's configuration.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let bind_address: SocketAddr = self
            .server
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind address: {}", self.server.bind_address))?;

        Ok(ServerConfig {
            bind_address,
            max_connections_per_ip: self.server.max_connections_per_ip,
            queue_capacity: self.server.queue_capacity,
            max_request_size: self.server.max_request_size,
            broadcast_interval_ms: self.server.broadcast_interval_ms,
            trust_forwarded_for: self.server.trust_forwarded_for,
        })
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections_per_ip == 0 {
            return Err("max_connections_per_ip must be at least 1".to_string());
        }
        if self.server.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }
        if self.server.max_request_size == 0 {
            return Err("max_request_size must be at least 1".to_string());
        }
        if self.server.broadcast_interval_ms == 0 {
            return Err("broadcast_interval_ms must be at least 1".to_string());
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
