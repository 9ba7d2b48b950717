//! Configuration management for ClipStash
//!
//! Settings live in a single TOML file. Every key has a default, so an empty
//! or missing file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::history::StoreOptions;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "CLIPSTASH_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading or writing the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Number of history rows kept before the oldest are evicted
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Save every new clipboard value automatically
    #[serde(default)]
    pub auto_monitor_enabled: bool,

    /// Seconds between clipboard polls
    #[serde(default = "default_polling_interval")]
    pub polling_interval: f64,

    /// Whether the app should be registered to start at login
    #[serde(default)]
    pub launch_at_login: bool,

    /// Pinned flag given to rows created by auto-save
    #[serde(default)]
    pub pin_on_save: bool,

    /// Path to the SQLite history database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_items() -> usize {
    50
}

fn default_polling_interval() -> f64 {
    0.5
}

fn default_database_path() -> PathBuf {
    PathBuf::from("~/.clipstash/clipstash.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            auto_monitor_enabled: false,
            polling_interval: default_polling_interval(),
            launch_at_login: false,
            pin_on_save: false,
            database_path: default_database_path(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from CLIPSTASH_CONFIG environment variable
    /// 2. ~/.config/clipstash/config.toml
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => {
                let mut config = Self::default();
                config.expand_paths();
                Ok(config)
            }
        }
    }

    /// Load configuration with optional custom path
    pub fn load_config(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        config.expand_paths();
        config.validate_config()?;
        Ok(config)
    }

    /// Path the default config file lives at, whether or not it exists
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("clipstash").join("config.toml"))
            .ok_or_else(|| {
                ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not find config directory",
                ))
            })
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::default_path().ok().filter(|p| p.exists())
    }

    fn expand_paths(&mut self) {
        self.database_path = expand_path(&self.database_path);
    }

    /// Validate configuration values
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        if !(1..=10_000).contains(&self.max_items) {
            return Err(ConfigError::Validation(format!(
                "max_items must be between 1 and 10000, got {}",
                self.max_items
            )));
        }

        if !self.polling_interval.is_finite() || !(0.05..=60.0).contains(&self.polling_interval) {
            return Err(ConfigError::Validation(format!(
                "polling_interval must be between 0.05 and 60 seconds, got {}",
                self.polling_interval
            )));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "database_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Clipboard polling interval
    pub fn polling_duration(&self) -> Duration {
        Duration::from_secs_f64(self.polling_interval)
    }

    /// Store behaviour derived from these settings
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            pin_on_save: self.pin_on_save,
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the commented example file to `path`
    pub fn write_example(path: &Path, force: bool) -> Result<(), ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::Validation(format!(
                "Config file already exists at {}. Use --force to overwrite.",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::generate_example())?;
        Ok(())
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# ClipStash Configuration File
# Location: ~/.config/clipstash/config.toml

# Number of history items kept; the oldest are evicted beyond this
max_items = {}

# Save every new clipboard value automatically
auto_monitor_enabled = {}

# Seconds between clipboard checks
polling_interval = {:?}

# Start at login (registration is handled by the desktop shell)
launch_at_login = {}

# Pin rows created by automatic saving
pin_on_save = {}

# Path to history database
database_path = "{}"

# Logging level (trace, debug, info, warn, error)
log_level = "{}"
"#,
            config.max_items,
            config.auto_monitor_enabled,
            config.polling_interval,
            config.launch_at_login,
            config.pin_on_save,
            config.database_path.display(),
            config.log_level
        )
    }
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
