//! Configuration file support for intfd.
//!
//! Loads and validates intfd configuration from TOML files.
//! Default location: /etc/sonic/intfd.toml

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IntfdError, IntfdResult};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/intfd.toml";

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number for CONFIG_DB
    #[serde(default = "default_config_db")]
    pub config_db: u32,

    /// Redis database number for STATE_DB
    #[serde(default = "default_state_db")]
    pub state_db: u32,

    /// Maximum changes popped per table per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Daemon runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Store poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Control socket path
    #[serde(default = "default_unixctl_path")]
    pub unixctl_path: String,

    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Complete intfd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntfdConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Daemon configuration
    #[serde(default)]
    pub daemon: DaemonConfig,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_config_db() -> u32 {
    4
}

fn default_state_db() -> u32 {
    6
}

fn default_batch_size() -> usize {
    128
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_unixctl_path() -> String {
    "/var/run/intfd.ctl".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            config_db: default_config_db(),
            state_db: default_state_db(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            unixctl_path: default_unixctl_path(),
            log_level: default_log_level(),
        }
    }
}

impl IntfdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> IntfdResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| match e {
                IntfdError::InvalidConfig { message, .. } => {
                    IntfdError::invalid_config(path.display().to_string(), message)
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(IntfdError::Io(e)),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> IntfdResult<Self> {
        toml::from_str(content).map_err(|e| IntfdError::invalid_config("config", e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> IntfdResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| IntfdError::invalid_config("config", e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> IntfdResult<()> {
        if self.database.redis_port == 0 {
            return Err(IntfdError::invalid_config("redis_port", "must be > 0"));
        }

        if self.database.batch_size == 0 {
            return Err(IntfdError::invalid_config("batch_size", "must be > 0"));
        }

        if self.daemon.poll_interval_ms == 0 {
            return Err(IntfdError::invalid_config("poll_interval_ms", "must be > 0"));
        }

        if self.daemon.unixctl_path.is_empty() {
            return Err(IntfdError::invalid_config("unixctl_path", "must not be empty"));
        }

        Ok(())
    }
}
