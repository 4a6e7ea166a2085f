//! Application settings

use crate::cli::OutputFormat;
use crate::core::logger::DEFAULT_MAX_ENTRIES;
use crate::core::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config load/save errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("{path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this config
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Periodic polling settings
    pub polling: PollingConfig,
    /// Activity log settings
    pub logging: LoggingConfig,
    /// Output settings
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load config from the default location, or defaults if there is none
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Load config from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Default polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_log_entries: config.logging.max_entries,
            timestamps: config.logging.timestamps,
            log_file: config.logging.file.clone(),
            ..Self::default()
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between reading requests in milliseconds
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Activity log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// In-memory buffer size
    pub max_entries: usize,
    /// Add timestamps
    pub timestamps: bool,
    /// Mirror the activity log to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            timestamps: true,
            file: None,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format
    pub format: OutputFormat,
}
