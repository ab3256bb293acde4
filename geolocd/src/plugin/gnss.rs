//! GNSS-specific plugin operations and their data types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PositionPlugin;
use crate::error::ErrorCode;
use crate::position::Position;
use crate::time_sync::NtpTime;

/// How the GNSS engine may use network assistance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    /// Autonomous fixes only.
    #[default]
    Standalone,
    /// Assistance data from SUPL, position computed on the device.
    MsBased,
    /// Position computed by the network from device measurements.
    MsAssisted,
}

impl fmt::Display for PositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "standalone"),
            Self::MsBased => write!(f, "ms_based"),
            Self::MsAssisted => write!(f, "ms_assisted"),
        }
    }
}

impl FromStr for PositionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standalone" | "0" => Ok(Self::Standalone),
            "ms_based" | "msb" | "1" => Ok(Self::MsBased),
            "ms_assisted" | "msa" | "2" => Ok(Self::MsAssisted),
            other => Err(format!("unknown position mode '{}'", other)),
        }
    }
}

/// One NMEA 0183 sentence with the time it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmeaSentence {
    pub timestamp: i64,
    pub sentence: String,
}

/// Circular geofence monitored by the GNSS engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeofenceArea {
    pub id: i32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "radius")]
    pub radius_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceTransition {
    Entered,
    Exited,
    Uncertain,
}

/// A geofence breach reported by the plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceEvent {
    pub id: i32,
    pub transition: GeofenceTransition,
    pub position: Option<Position>,
}

/// GNSS plugin operations beyond the common set.
///
/// Every method defaults to `NotImplemented` so simple receivers only
/// implement what their hardware supports.
pub trait GnssPlugin: PositionPlugin {
    fn get_satellite_data(&self, _enable: bool) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn get_nmea_data(&self, _enable: bool) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn send_extra_command(&self, _command: &str) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn set_position_mode(
        &self,
        _mode: PositionMode,
        _fix_interval: Duration,
    ) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn inject_time(&self, _time: &NtpTime) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn inject_xtra_data(&self, _data: &[u8]) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn add_geofence(&self, _area: &GeofenceArea) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn remove_geofence(&self, _id: i32) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn pause_geofence(&self, _id: i32) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }

    fn resume_geofence(&self, _id: i32) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotImplemented)
    }
}
