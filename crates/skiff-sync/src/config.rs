//! Engine configuration.
//!
//! Loaded once at construction from `~/.skiff/config.toml` (or an explicit
//! path). A missing file is not an error; a file that fails to parse or
//! validate is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config file: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

/// Timing knobs for the refresh scheduler and event bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Quiet period after the last qualifying filesystem event before a
    /// reactive full refresh fires.
    pub debounce_ms: u64,
    /// Cadence of the periodic working-tree files refresh.
    pub files_refresh_secs: u64,
    /// Cadence of the periodic remote-freshness check.
    pub remote_check_secs: u64,
    /// Bound of the update event channel.
    pub bus_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            files_refresh_secs: 10,
            remote_check_secs: 60,
            bus_capacity: 64,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn files_refresh(&self) -> Duration {
        Duration::from_secs(self.files_refresh_secs)
    }

    pub fn remote_check(&self) -> Duration {
        Duration::from_secs(self.remote_check_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidConfiguration {
                message: "debounce_ms must be greater than zero".to_string(),
            });
        }
        if self.files_refresh_secs == 0 || self.remote_check_secs == 0 {
            return Err(ConfigError::InvalidConfiguration {
                message: "refresh periods must be greater than zero".to_string(),
            });
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::InvalidConfiguration {
                message: "bus_capacity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; parse and validation errors fail.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    event = "sync.config.file_missing",
                    path = %path.display(),
                    "Using default configuration"
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;

        debug!(event = "sync.config.loaded", path = %path.display());
        Ok(config)
    }

    /// Default user config location: `~/.skiff/config.toml`.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".skiff").join("config.toml"))
    }
}
