//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and runtime creation
//! so command handlers only deal with their own work.

use std::path::{Path, PathBuf};

use geolocd::config::{config_file_path, ConfigFile};
use geolocd::context::AppContext;
use geolocd::logging::{init_logging, LoggingGuard};
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    _logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Load config from `config_path` (or the default path) and start logging.
    ///
    /// # Arguments
    ///
    /// * `stdout` - Mirror log output to stdout
    /// * `debug` - Enable debug-level logging regardless of RUST_LOG
    pub fn new(config_path: Option<&Path>, stdout: bool, debug: bool) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let log_path = &config.logging.file;
        let log_dir = log_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let log_file = log_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| geolocd::config::DEFAULT_LOG_FILE.to_string());

        let logging_guard = init_logging(&log_dir, &log_file, stdout, debug)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("geolocd v{}", geolocd::VERSION);
        info!(config = %self.config_path.display(), "geolocd CLI: {} command", command);
    }

    /// Multi-threaded runtime for the async parts of a command.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("geolocd-worker")
            .build()
            .map_err(CliError::Runtime)
    }

    /// Build the application context from the loaded configuration.
    ///
    /// Must be called inside `runtime` so the HTTP transport can spawn.
    pub fn create_context(&self) -> Result<AppContext, CliError> {
        let context = AppContext::from_config(&self.config)?;
        info!(
            plugins = ?context.handlers().available(),
            providers = ?context.registry().names(),
            "Location service context created"
        );
        Ok(context)
    }
}
