//! Default values and constants for all configuration settings.

use super::file::config_directory;
use super::settings::*;
use crate::criteria::{SelectionPolicy, DEFAULT_MIN_DISTANCE_M};
use crate::plugin::PositionMode;

/// Socket file name inside the config directory.
pub const DEFAULT_SOCKET_NAME: &str = "geolocd.sock";

/// Default minimum time between criteria replies (0 = no rate limit).
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 0;

/// Default GPS fix interval.
pub const DEFAULT_FIX_INTERVAL_MS: u64 = 1000;

/// Default geocoding provider.
pub const DEFAULT_WSP_PROVIDER: &str = "google";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "geolocd.log";

/// Default delay between replayed fixes.
pub const DEFAULT_REPLAY_INTERVAL_MS: u64 = 1000;

/// Last-position store file name inside the config directory.
pub const DEFAULT_LAST_POSITION_FILE: &str = "last_position.json";

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = config_directory();

        Self {
            daemon: DaemonSettings {
                socket: config_dir.join(DEFAULT_SOCKET_NAME),
            },
            criteria: CriteriaSettings {
                min_distance_m: DEFAULT_MIN_DISTANCE_M,
                min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
                policy: SelectionPolicy::default(),
            },
            gps: GpsSettings {
                parameters: None,
                position_mode: PositionMode::default(),
                fix_interval_ms: DEFAULT_FIX_INTERVAL_MS,
            },
            wsp: WspSettings {
                config: None,
                provider: DEFAULT_WSP_PROVIDER.to_string(),
            },
            storage: StorageSettings {
                last_position: Some(config_dir.join(DEFAULT_LAST_POSITION_FILE)),
            },
            logging: LoggingSettings {
                file: config_dir.join("logs").join(DEFAULT_LOG_FILE),
            },
            plugins: PluginSettings {
                gps: None,
                wifi: None,
                cell: None,
                hybrid: None,
                replay_interval_ms: DEFAULT_REPLAY_INTERVAL_MS,
            },
        }
    }
}
