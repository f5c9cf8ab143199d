//! Configuration module for wirecast
//!
//! This module handles engine configuration including:
//! - Broker sizing and the delivery policy for subscriber mailboxes
//! - Evaluation deadlines and node thread sizing
//! - Logging filter and optional log file
//!
//! # Config Location
//!
//! The default config file lives in the platform-appropriate config directory
//! under `wirecast/wirecast.toml`:
//! - **Linux**: `~/.config/wirecast/wirecast.toml`
//! - **macOS**: `~/Library/Application Support/wirecast/wirecast.toml`
//! - **Windows**: `%APPDATA%\wirecast\wirecast.toml`
//!
//! # Example
//!
//! ```
//! use wirecast::config::{DeliveryPolicy, EngineConfig};
//!
//! # fn main() -> wirecast::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("wirecast.toml");
//!
//! let mut config = EngineConfig::load_or_default(&path);
//! config.broker.delivery = DeliveryPolicy::Reliable;
//! config.save(&path)?;
//!
//! assert_eq!(EngineConfig::load(&path)?.broker.delivery, DeliveryPolicy::Reliable);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, WireError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "wirecast";

/// Config filename
pub const CONFIG_FILE: &str = "wirecast.toml";

/// Default subscriber mailbox capacity. Each topic is published once, and a
/// transfer bot receives at most two chips, so three slots cover every fan-in.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 3;

/// Default capacity of the broker's command queue
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Default deadline for a whole evaluation run in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default stack size for node threads in KiB
pub const DEFAULT_THREAD_STACK_KIB: usize = 256;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,wirecast=debug";

// ==================== Engine Config ====================

/// Complete engine configuration, stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config path (`<config dir>/wirecast/wirecast.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
    }

    /// Load and validate a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WireError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            WireError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default config: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to disk as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WireError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| WireError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            WireError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject settings the runtime cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.broker.mailbox_capacity == 0 {
            return Err(WireError::Config(
                "broker.mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if self.broker.command_buffer == 0 {
            return Err(WireError::Config(
                "broker.command_buffer must be at least 1".to_string(),
            ));
        }
        if self.evaluation.thread_stack_kib == 0 {
            return Err(WireError::Config(
                "evaluation.thread_stack_kib must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Broker Config ====================

/// How the broker hands a published value to a subscriber's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Bounded mailboxes, non-blocking send. A full mailbox silently loses the
    /// value for that subscriber (the drop is counted and logged).
    #[default]
    BestEffort,
    /// Unbounded mailboxes. Delivery never drops while the subscriber exists.
    Reliable,
}

impl std::fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryPolicy::BestEffort => write!(f, "best-effort"),
            DeliveryPolicy::Reliable => write!(f, "reliable"),
        }
    }
}

/// Broker sizing and delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Capacity of each subscriber mailbox under [`DeliveryPolicy::BestEffort`]
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Capacity of the broker's command queue
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    #[serde(default)]
    pub delivery: DeliveryPolicy,
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

fn default_command_buffer() -> usize {
    DEFAULT_COMMAND_BUFFER
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            delivery: DeliveryPolicy::BestEffort,
        }
    }
}

// ==================== Evaluation Config ====================

/// Evaluation run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Deadline for one run in milliseconds. `0` waits forever, as a node
    /// whose operand is never published would.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Stack size for each node thread
    #[serde(default = "default_thread_stack_kib")]
    pub thread_stack_kib: usize,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_thread_stack_kib() -> usize {
    DEFAULT_THREAD_STACK_KIB
}

impl EvaluationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn thread_stack_bytes(&self) -> usize {
        self.thread_stack_kib * 1024
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            thread_stack_kib: DEFAULT_THREAD_STACK_KIB,
        }
    }
}

// ==================== Logging Config ====================

/// Logging settings for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Also write logs to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.broker.mailbox_capacity, 3);
        assert_eq!(config.broker.delivery, DeliveryPolicy::BestEffort);
        assert_eq!(config.evaluation.timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [broker]
            delivery = "reliable"
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.delivery, DeliveryPolicy::Reliable);
        assert_eq!(config.broker.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_zero_timeout_means_no_deadline() {
        let mut config = EvaluationConfig::default();
        config.timeout_ms = 0;
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = EngineConfig::default();
        config.broker.mailbox_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mailbox_capacity"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = EngineConfig::default();
        config.broker.delivery = DeliveryPolicy::Reliable;
        config.evaluation.timeout_ms = 1_500;
        config.logging.file = Some(PathBuf::from("/tmp/wirecast.log"));
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(dir.path().join("absent.toml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_delivery_policy_display() {
        assert_eq!(DeliveryPolicy::BestEffort.to_string(), "best-effort");
        assert_eq!(DeliveryPolicy::Reliable.to_string(), "reliable");
    }
}
