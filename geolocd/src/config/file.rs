//! Configuration file handling for ~/.geolocd/config.ini.
//!
//! Loads and saves the daemon configuration with sensible defaults.

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFileError {
    pub(super) fn invalid(section: &str, key: &str, value: &str, reason: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.geolocd/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        std::fs::write(path, self.render()).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Render the configuration as the INI text `save_to` would write.
    pub fn render(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Create a default config file at `path` if none exists.
    ///
    /// Returns `true` when a file was written.
    pub fn ensure_exists(path: &Path) -> Result<bool, ConfigFileError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        Ok(true)
    }
}

/// Get the path to the config directory (~/.geolocd).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".geolocd")
}

/// Get the path to the config file (~/.geolocd/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::criteria::DEFAULT_MIN_DISTANCE_M;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert_eq!(config.criteria.min_distance_m, DEFAULT_MIN_DISTANCE_M);
        assert_eq!(config.criteria.min_interval_ms, DEFAULT_MIN_INTERVAL_MS);
        assert_eq!(config.gps.fix_interval_ms, DEFAULT_FIX_INTERVAL_MS);
        assert_eq!(config.wsp.provider, DEFAULT_WSP_PROVIDER);
        assert!(config.gps.parameters.is_none());
        assert!(config.plugins.gps.is_none());
        assert!(config.daemon.socket.ends_with(DEFAULT_SOCKET_NAME));
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(config.wsp.provider, DEFAULT_WSP_PROVIDER);
        assert_eq!(config.daemon.socket, ConfigFile::default().daemon.socket);
    }

    #[test]
    fn test_ensure_exists_writes_once() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        assert!(ConfigFile::ensure_exists(&config_path).unwrap());
        assert!(config_path.exists());
        assert!(!ConfigFile::ensure_exists(&config_path).unwrap());
    }

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigFileError::invalid("gps", "fix_interval_ms", "soon", "must be a number");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: gps.fix_interval_ms = 'soon' - must be a number"
        );
    }
}
