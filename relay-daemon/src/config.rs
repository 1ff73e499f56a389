//! Configuration management

use anyhow::{Context, Result};
use relay_bridge::DEFAULT_CAPACITY;
use relay_broadcaster::BroadcasterConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Interface the WebSocket listener binds to
    pub host: String,

    /// WebSocket listener port
    pub port: u16,

    /// Messages held between producer and broadcaster before the producer suspends
    pub queue_capacity: usize,

    /// Per-subscriber send timeout (milliseconds)
    pub send_timeout_ms: u64,

    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            host: "0.0.0.0".to_string(),
            port: 8765,
            queue_capacity: DEFAULT_CAPACITY,
            send_timeout_ms: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load configuration from `config_path`, writing defaults there if it is missing
    pub fn load_from(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if self.send_timeout_ms == 0 {
            anyhow::bail!("send_timeout_ms must be at least 1");
        }
        if self.host.trim().is_empty() {
            anyhow::bail!("host must not be empty");
        }
        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            bind_addr: self.bind_addr(),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            ..BroadcasterConfig::default()
        }
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relay")
            .join("config.toml")
    }
}
