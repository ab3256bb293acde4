//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::criteria::SelectionPolicy;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [daemon] section
    if let Some(section) = ini.section(Some("daemon")) {
        if let Some(v) = section.get("socket") {
            if let Some(path) = optional_path(v) {
                config.daemon.socket = path;
            }
        }
    }

    // [criteria] section
    if let Some(section) = ini.section(Some("criteria")) {
        for (key, v) in section.iter() {
            match key {
                "min_distance_m" => {
                    config.criteria.min_distance_m = v
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite() && *d >= 0.0)
                        .ok_or_else(|| {
                            ConfigFileError::invalid(
                                "criteria",
                                key,
                                v,
                                "must be a non-negative number of meters",
                            )
                        })?;
                }
                "min_interval_ms" => {
                    config.criteria.min_interval_ms = parse_u64("criteria", key, v)?;
                }
                _ => {
                    let Some((accuracy, power)) = SelectionPolicy::parse_key(key) else {
                        tracing::warn!(section = "criteria", key, "Unknown config key ignored");
                        continue;
                    };
                    let handlers = SelectionPolicy::parse_handlers(v).map_err(|_| {
                        ConfigFileError::invalid(
                            "criteria",
                            key,
                            v,
                            "must be a comma-separated list of: gps, wifi, cell, hybrid, network",
                        )
                    })?;
                    config.criteria.policy.set(accuracy, power, handlers);
                }
            }
        }
    }

    // [gps] section
    if let Some(section) = ini.section(Some("gps")) {
        if let Some(v) = section.get("parameters") {
            config.gps.parameters = optional_path(v);
        }
        if let Some(v) = section.get("position_mode") {
            config.gps.position_mode = v.parse().map_err(|_| {
                ConfigFileError::invalid(
                    "gps",
                    "position_mode",
                    v,
                    "must be one of: standalone, ms_based, ms_assisted",
                )
            })?;
        }
        if let Some(v) = section.get("fix_interval_ms") {
            let interval = parse_u64("gps", "fix_interval_ms", v)?;
            if interval == 0 {
                return Err(ConfigFileError::invalid(
                    "gps",
                    "fix_interval_ms",
                    v,
                    "must be greater than zero",
                ));
            }
            config.gps.fix_interval_ms = interval;
        }
    }

    // [wsp] section
    if let Some(section) = ini.section(Some("wsp")) {
        if let Some(v) = section.get("config") {
            config.wsp.config = optional_path(v);
        }
        if let Some(v) = section.get("provider") {
            let v = v.trim();
            if v.is_empty() {
                return Err(ConfigFileError::invalid(
                    "wsp",
                    "provider",
                    v,
                    "must name a provider from the WSP config",
                ));
            }
            config.wsp.provider = v.to_string();
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = section.get("last_position") {
            config.storage.last_position = optional_path(v);
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            if let Some(path) = optional_path(v) {
                config.logging.file = path;
            }
        }
    }

    // [plugins] section
    if let Some(section) = ini.section(Some("plugins")) {
        if let Some(v) = section.get("gps") {
            config.plugins.gps = optional_path(v);
        }
        if let Some(v) = section.get("wifi") {
            config.plugins.wifi = optional_path(v);
        }
        if let Some(v) = section.get("cell") {
            config.plugins.cell = optional_path(v);
        }
        if let Some(v) = section.get("hybrid") {
            config.plugins.hybrid = optional_path(v);
        }
        if let Some(v) = section.get("replay_interval_ms") {
            config.plugins.replay_interval_ms = parse_u64("plugins", "replay_interval_ms", v)?;
        }
    }

    Ok(config)
}

fn parse_u64(section: &str, key: &str, value: &str) -> Result<u64, ConfigFileError> {
    value.trim().parse().map_err(|_| {
        ConfigFileError::invalid(section, key, value, "must be a non-negative integer")
    })
}

/// Empty values mean "not set".
fn optional_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| expand_tilde(value))
}

/// Expand a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
