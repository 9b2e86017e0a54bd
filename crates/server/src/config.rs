//! Configuration management for the remofs server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/remofs/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use protocol::ContentEncoding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bind_address must be a socket address like 127.0.0.1:9999, got {0}")]
    InvalidBindAddress(String),

    #[error("backlog must be between 1 and 65535, got {0}")]
    InvalidBacklog(u32),

    #[error("max_frame_size must be between {min} and {max} bytes, got {got}")]
    InvalidMaxFrameSize { got: usize, min: usize, max: usize },

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Smallest accepted frame size limit (1 KiB).
const MIN_FRAME_SIZE: usize = 1024;

/// Largest accepted frame size limit (1 GiB).
const MAX_FRAME_SIZE_LIMIT: usize = 1024 * 1024 * 1024;

/// Main configuration structure for the remofs server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerConfig,

    /// Exported directory tree.
    pub export: ExportConfig,

    /// Framing and connection behaviour.
    pub transport: TransportConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`.
    pub bind_address: String,

    /// Pending connection queue length.
    pub backlog: u32,
}

/// Exported directory tree configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory exposed to clients. Relative paths are taken from the
    /// working directory.
    pub root: PathBuf,

    /// Create the root at startup if it does not exist.
    pub create_if_missing: bool,

    /// Encoding of file content in download responses.
    pub content_encoding: ContentEncoding,
}

/// Framing and connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest frame accepted or sent, in bytes.
    pub max_frame_size: usize,

    /// Compress large frames with LZ4.
    pub compression: bool,

    /// Close a connection after this many idle seconds (0 = never).
    pub idle_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Optional file that receives a copy of the log output.
    pub file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9999".to_string(),
            backlog: 128,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            create_if_missing: true,
            content_encoding: ContentEncoding::Hex,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: protocol::MAX_FRAME_SIZE,
            compression: true,
            idle_timeout_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remofs")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - REMOFS_BIND_ADDRESS: Override listen address
    /// - REMOFS_EXPORT_ROOT: Override exported directory
    /// - REMOFS_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("REMOFS_BIND_ADDRESS") {
            if !addr.is_empty() {
                tracing::info!("Overriding bind_address from environment: {}", addr);
                self.server.bind_address = addr;
            }
        }

        if let Ok(root) = std::env::var("REMOFS_EXPORT_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding export root from environment: {}", root);
                self.export.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("REMOFS_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        if self.server.backlog < 1 || self.server.backlog > 65535 {
            return Err(ConfigError::InvalidBacklog(self.server.backlog));
        }

        let frame = self.transport.max_frame_size;
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&frame) {
            return Err(ConfigError::InvalidMaxFrameSize {
                got: frame,
                min: MIN_FRAME_SIZE,
                max: MAX_FRAME_SIZE_LIMIT,
            });
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// The parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind_address.clone()))
    }

    /// Idle timeout, if one is configured.
    pub fn idle_timeout(&self) -> Option<std::time::Duration> {
        match self.transport.idle_timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
