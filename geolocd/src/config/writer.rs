//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use crate::criteria::{AccuracyCriterion, PowerCriterion};

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let optional = |p: &Option<std::path::PathBuf>| {
        p.as_ref().map(|p| path_to_string(p)).unwrap_or_default()
    };

    let mut policy = String::new();
    for accuracy in AccuracyCriterion::ALL {
        for power in PowerCriterion::ALL {
            let handlers = config
                .criteria
                .policy
                .lookup(accuracy, power)
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            policy.push_str(&format!("{}_{} = {}\n", accuracy, power, handlers));
        }
    }

    format!(
        r#"[daemon]
; Unix socket for client requests (newline-delimited JSON)
socket = {}

[criteria]
; A tracking subscriber gets a new fix only after moving at least this far (meters)
min_distance_m = {}
; Minimum time between two fixes sent to one subscriber (0 = no limit)
min_interval_ms = {}
; Handlers enabled for each <accuracy>_<power> pair, highest priority first.
; Handlers without a position source are skipped.
;   gps, wifi, cell, hybrid, network
{}
[gps]
; GPS parameter file (SUPL_HOST, XTRA_SERVER_1..3, NTP_SERVER, ...)
parameters = {}
; Default position mode when the parameter file sets none:
;   standalone  - autonomous fixes only
;   ms_based    - SUPL assistance, fix computed on the device
;   ms_assisted - fix computed by the network
position_mode = {}
; Default interval between GPS fixes in milliseconds
fix_interval_ms = {}

[wsp]
; Web-service provider JSON document (providers, API keys, feature URLs)
config = {}
; Provider used for geocode and reverse geocode requests
provider = {}

[storage]
; Last known position per handler. Leave empty to keep it in memory only.
last_position = {}

[logging]
file = {}

[plugins]
; Recorded fixes replayed as position sources (JSON lines).
; A handler without a file is reported as not available.
gps = {}
wifi = {}
cell = {}
hybrid = {}
; Delay between two replayed fixes in milliseconds
replay_interval_ms = {}
"#,
        path_to_string(&config.daemon.socket),
        config.criteria.min_distance_m,
        config.criteria.min_interval_ms,
        policy,
        optional(&config.gps.parameters),
        config.gps.position_mode,
        config.gps.fix_interval_ms,
        optional(&config.wsp.config),
        config.wsp.provider,
        optional(&config.storage.last_position),
        path_to_string(&config.logging.file),
        optional(&config.plugins.gps),
        optional(&config.plugins.wifi),
        optional(&config.plugins.cell),
        optional(&config.plugins.hybrid),
        config.plugins.replay_interval_ms,
    )
}

/// Collapse the home directory back to `~/`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::ConfigFile;
    use crate::criteria::{AccuracyCriterion, PowerCriterion};
    use crate::handler::HandlerType;
    use crate::plugin::PositionMode;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.daemon.socket = PathBuf::from("/run/geolocd/geolocd.sock");
        config.criteria.min_distance_m = 42.5;
        config.criteria.min_interval_ms = 2000;
        config.criteria.policy.set(
            AccuracyCriterion::Medium,
            PowerCriterion::Low,
            vec![HandlerType::Cell],
        );
        config.gps.position_mode = PositionMode::MsAssisted;
        config.gps.parameters = Some(PathBuf::from("/etc/geolocd/gps.conf"));
        config.wsp.provider = "nominatim".to_string();
        config.storage.last_position = None;
        config.plugins.wifi = Some(PathBuf::from("/var/lib/geolocd/wifi.jsonl"));

        config.save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded.daemon.socket, config.daemon.socket);
        assert_eq!(loaded.criteria.min_distance_m, 42.5);
        assert_eq!(loaded.criteria.min_interval_ms, 2000);
        assert_eq!(loaded.criteria.policy, config.criteria.policy);
        assert_eq!(loaded.gps.position_mode, PositionMode::MsAssisted);
        assert_eq!(loaded.gps.parameters, config.gps.parameters);
        assert_eq!(loaded.wsp.provider, "nominatim");
        assert!(loaded.storage.last_position.is_none());
        assert_eq!(loaded.plugins.wifi, config.plugins.wifi);
        assert!(loaded.plugins.gps.is_none());
    }

    #[test]
    fn test_written_file_is_commented() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        ConfigFile::default().save_to(&config_path).unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[criteria]"));
        assert!(content.contains("fine_high = gps, wifi, cell, hybrid\n"));
        assert!(content.contains("; Unix socket"));
    }
}
