//! Configuration loading using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the bridge runs with no configuration at all)
//! 2. A TOML file, `config/adl_bridge.toml` unless another path is given
//! 3. Environment variables prefixed with `ADL_BRIDGE_`, using `__` between
//!    section and key
//!
//! # Example
//! ```no_run
//! use adl_bridge::config::BridgeConfig;
//!
//! # fn main() -> adl_bridge::error::BridgeResult<()> {
//! // ADL_BRIDGE_SITE__LOCATION=Kitchen overrides [site] location
//! let config = BridgeConfig::load()?;
//! println!("Writing to {}", config.storage.data_dir.display());
//! # Ok(())
//! # }
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::queue::DEFAULT_QUEUE_KEY;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/adl_bridge.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "ADL_BRIDGE_";

/// Top-level bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Message queue settings
    pub queue: QueueConfig,
    /// Log file settings
    pub storage: StorageConfig,
    /// Site labels stamped on environmental rows
    pub site: SiteConfig,
    /// Diagnostic logging settings
    pub logging: LoggingConfig,
}

/// Message queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// System V key shared with the producer
    pub key: i32,
    /// Longest wait for a message before checking for shutdown, in milliseconds
    pub poll_interval_ms: u64,
}

/// Log file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving the daily `.dat` files
    pub data_dir: PathBuf,
}

/// Site labels for the `HomeOwner` and `Location` columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Value of the `HomeOwner` column
    pub home_owner: String,
    /// Value of the `Location` column
    pub location: String,
}

/// Diagnostic logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_QUEUE_KEY,
            poll_interval_ms: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            home_owner: "HMK".to_string(),
            location: "Toilet".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl QueueConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from the default file and the environment.
    pub fn load() -> BridgeResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BridgeResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid logging level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(BridgeError::Configuration(format!(
                "Invalid logging format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.queue.poll_interval_ms == 0 {
            return Err(BridgeError::Configuration(
                "queue.poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(BridgeError::Configuration(
                "storage.data_dir must not be empty".into(),
            ));
        }

        // Site labels are written into rows unescaped.
        for (name, value) in [
            ("site.home_owner", &self.site.home_owner),
            ("site.location", &self.site.location),
        ] {
            if value.contains([',', '\n', '\r']) {
                return Err(BridgeError::Configuration(format!(
                    "{name} '{}' must not contain commas or line breaks",
                    value.escape_debug()
                )));
            }
        }

        Ok(())
    }
}
