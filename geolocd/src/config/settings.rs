//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

use crate::criteria::SelectionPolicy;
use crate::plugin::PositionMode;

/// Complete daemon configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// IPC endpoint
    pub daemon: DaemonSettings,
    /// Criteria tracking filter and handler selection
    pub criteria: CriteriaSettings,
    /// GPS handler defaults
    pub gps: GpsSettings,
    /// Web-service providers
    pub wsp: WspSettings,
    /// Last-known-position store
    pub storage: StorageSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Position sources
    pub plugins: PluginSettings,
}

/// Daemon endpoint configuration.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Unix socket the IPC server listens on
    pub socket: PathBuf,
}

/// Criteria tracking configuration.
#[derive(Debug, Clone)]
pub struct CriteriaSettings {
    /// Minimum movement in meters before a subscriber gets another fix.
    pub min_distance_m: f64,
    /// Minimum time between two fixes sent to one subscriber.
    /// Default: 0 (distance filter only)
    pub min_interval_ms: u64,
    /// Handlers chosen for each accuracy/power pair.
    /// Overridden per pair with keys such as `fine_high = gps, wifi`.
    pub policy: SelectionPolicy,
}

/// GPS handler configuration.
#[derive(Debug, Clone)]
pub struct GpsSettings {
    /// Path to the `KEY=value` GPS parameter file
    pub parameters: Option<PathBuf>,
    /// Position mode used when the parameter file does not set one
    pub position_mode: PositionMode,
    /// Fix interval used when the parameter file does not set one
    pub fix_interval_ms: u64,
}

/// Web-service provider configuration.
#[derive(Debug, Clone)]
pub struct WspSettings {
    /// Provider JSON document
    pub config: Option<PathBuf>,
    /// Provider used for geocoding requests
    pub provider: String,
}

/// Last-known-position storage.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// JSON file holding the last fix per handler; `None` keeps fixes in memory only
    pub last_position: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}

/// Position sources.
///
/// Each handler is backed by a replay file of recorded fixes; a handler
/// without a file is reported as not available.
#[derive(Debug, Clone)]
pub struct PluginSettings {
    pub gps: Option<PathBuf>,
    pub wifi: Option<PathBuf>,
    pub cell: Option<PathBuf>,
    pub hybrid: Option<PathBuf>,
    /// Delay between two replayed fixes
    pub replay_interval_ms: u64,
}
