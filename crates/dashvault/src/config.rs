//! Configuration management for dashvault.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "dashvault";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "userdata.db";

/// Prefix that namespaces every per-user record key.
pub const DEFAULT_KEY_PREFIX: &str = "user_data_";

/// Quiet period for debounced writes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `DASHVAULT_`, sections separated
///    by a double underscore, e.g. `DASHVAULT_PERSISTENCE__DEBOUNCE_MS`)
/// 2. TOML config file at `~/.config/dashvault/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Write behaviour configuration.
    pub persistence: PersistenceConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/dashvault/userdata.db`
    pub database_path: Option<PathBuf>,
    /// Prefix prepended to a user id to form its record key.
    pub key_prefix: String,
    /// Maximum total bytes the store may hold.
    /// Set to 0 for unlimited.
    pub quota_bytes: usize,
}

/// Write behaviour configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet period in milliseconds before a debounced write is flushed.
    pub debounce_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Resolved at runtime
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            quota_bytes: 0,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("DASHVAULT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.key_prefix.is_empty() {
            return Err(Error::ConfigValidation {
                message: "key_prefix must not be empty".to_string(),
            });
        }

        // Reserved keys must never look like a namespaced record
        let reserved = [
            crate::accounts::SESSION_KEY,
            crate::accounts::USERS_KEY,
            crate::accounts::RESET_TOKENS_KEY,
        ]
        .into_iter()
        .chain(crate::store::legacy::LEGACY_KEYS);
        for key in reserved {
            if key.starts_with(&self.storage.key_prefix) {
                return Err(Error::ConfigValidation {
                    message: format!(
                        "key_prefix '{}' collides with reserved key '{key}'",
                        self.storage.key_prefix
                    ),
                });
            }
        }

        if self.persistence.debounce_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "debounce_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the storage quota, `None` when unlimited.
    #[must_use]
    pub fn quota(&self) -> Option<usize> {
        if self.storage.quota_bytes == 0 {
            None
        } else {
            Some(self.storage.quota_bytes)
        }
    }

    /// Get the debounce quiet period as a Duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.persistence.debounce_ms)
    }
}
