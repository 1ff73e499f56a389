//! Command-line overrides for the daemon configuration

use clap::Parser;
use std::path::PathBuf;

use crate::config::DaemonConfig;

#[derive(Parser, Debug, Default)]
#[command(
    name = "relay-daemon",
    version,
    about = "Relays events from standard input to every connected WebSocket subscriber"
)]
pub struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface to listen on
    #[arg(long, env = "RELAY_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "RELAY_PORT")]
    pub port: Option<u16>,

    /// Messages buffered before the producer is suspended
    #[arg(long, env = "RELAY_QUEUE_CAPACITY")]
    pub capacity: Option<usize>,

    /// Per-subscriber send timeout in milliseconds
    #[arg(long, env = "RELAY_SEND_TIMEOUT_MS")]
    pub send_timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "RELAY_LOG")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(DaemonConfig::default_config_path)
    }

    /// Overlay the values given on the command line
    pub fn apply(&self, config: &mut DaemonConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.queue_capacity = capacity;
        }
        if let Some(timeout) = self.send_timeout_ms {
            config.send_timeout_ms = timeout;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}
