//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

pub use reliq_queue::{AutoPopConfig, QueueConfig};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broker connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Connection URL (`redis://`, `rediss://` or `unix://`).
    #[serde(default = "default_broker_url")]
    pub url: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
        }
    }
}

fn default_broker_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// In-flight recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Run a sweeper next to `work`.
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Only recover jobs created more than this many seconds ago.
    #[serde(default = "default_older_than")]
    pub older_than_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_sweep_interval(),
            older_than_secs: default_older_than(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_older_than() -> u64 {
    3600
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
