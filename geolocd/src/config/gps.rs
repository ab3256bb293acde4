//! GPS parameter file.
//!
//! A sectionless `KEY=value` list handed to the GNSS stack:
//!
//! ```text
//! SUPL_HOST=supl.example.com
//! SUPL_PORT=7275
//! XTRA_SERVER_1=https://xtra1.example.com/xtra2.bin
//! NTP_SERVER=pool.ntp.org
//! POSITION_MODE=ms_based
//! FIX_INTERVAL_MS=1000
//! ```
//!
//! Keys the daemon does not interpret are kept in [`GpsParameters::extra`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use ini::Ini;

use super::file::ConfigFileError;
use crate::plugin::PositionMode;

const SECTION: &str = "gps_parameters";
const XTRA_SERVER_KEYS: [&str; 3] = ["XTRA_SERVER_1", "XTRA_SERVER_2", "XTRA_SERVER_3"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsParameters {
    pub supl_host: Option<String>,
    pub supl_port: Option<u16>,
    /// XTRA download servers in the order they are tried.
    pub xtra_servers: Vec<String>,
    pub ntp_server: Option<String>,
    pub position_mode: Option<PositionMode>,
    pub fix_interval: Option<Duration>,
    pub extra: BTreeMap<String, String>,
}

impl GpsParameters {
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigFileError> {
        let mut params = Self::default();
        let mut xtra: [Option<String>; 3] = Default::default();

        for (key, value) in ini.general_section().iter() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "SUPL_HOST" => params.supl_host = Some(value.to_string()),
                "SUPL_PORT" => {
                    let port = value
                        .parse::<u16>()
                        .ok()
                        .filter(|p| *p != 0)
                        .ok_or_else(|| {
                            ConfigFileError::invalid(SECTION, key, value, "must be a port number")
                        })?;
                    params.supl_port = Some(port);
                }
                "NTP_SERVER" => params.ntp_server = Some(value.to_string()),
                "POSITION_MODE" => {
                    let mode = value.parse().map_err(|reason: String| {
                        ConfigFileError::invalid(SECTION, key, value, &reason)
                    })?;
                    params.position_mode = Some(mode);
                }
                "FIX_INTERVAL_MS" => {
                    let ms = value
                        .parse::<u64>()
                        .ok()
                        .filter(|ms| *ms > 0)
                        .ok_or_else(|| {
                            ConfigFileError::invalid(
                                SECTION,
                                key,
                                value,
                                "must be a positive number of milliseconds",
                            )
                        })?;
                    params.fix_interval = Some(Duration::from_millis(ms));
                }
                _ => match XTRA_SERVER_KEYS.iter().position(|k| *k == key) {
                    Some(slot) => xtra[slot] = Some(value.to_string()),
                    None => {
                        params.extra.insert(key.to_string(), value.to_string());
                    }
                },
            }
        }

        params.xtra_servers = xtra.into_iter().flatten().collect();
        Ok(params)
    }

    /// SUPL server as `host:port`, when both are set.
    pub fn supl_address(&self) -> Option<String> {
        match (&self.supl_host, self.supl_port) {
            (Some(host), Some(port)) => Some(format!("{}:{}", host, port)),
            _ => None,
        }
    }
}
