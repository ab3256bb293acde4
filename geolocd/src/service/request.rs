//! Client requests, tagged by `method`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::criteria::{AccuracyCriterion, Criteria, PowerCriterion};
use crate::handler::HandlerType;

fn default_handler() -> HandlerType {
    HandlerType::Gps
}

/// A decoded client request, tagged by `method`.
///
/// ```json
/// {"method": "startTrackingCriteria", "accuracy": "fine", "power": "low"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Request {
    /// One fix from `handler`.
    GetCurrentPosition {
        #[serde(default = "default_handler")]
        handler: HandlerType,
    },
    /// Every fix from `handler` until `stopTracking` or disconnect.
    StartTracking {
        #[serde(default = "default_handler")]
        handler: HandlerType,
    },
    /// Fixes from the handlers matching the criteria, distance filtered.
    #[serde(rename_all = "camelCase")]
    StartTrackingCriteria {
        accuracy: AccuracyCriterion,
        power: PowerCriterion,
        #[serde(default)]
        min_distance: Option<f64>,
        #[serde(default)]
        min_interval_ms: Option<u64>,
    },
    /// End this client's tracking on `handler`, or its criteria
    /// subscription when `handler` is omitted.
    StopTracking {
        #[serde(default)]
        handler: Option<HandlerType>,
    },
    GetLastPosition {
        #[serde(default = "default_handler")]
        handler: HandlerType,
    },
    GetGpsSatelliteData,
    SendExtraCommand {
        command: String,
    },
    GetGeoCodeLocation {
        address: String,
    },
    GetReverseLocation {
        latitude: f64,
        longitude: f64,
    },
    GetState {
        #[serde(default = "default_handler")]
        handler: HandlerType,
    },
    /// Raw GPS command table entry.
    SetGpsParameters {
        opcode: u8,
        #[serde(default)]
        data: Value,
    },
}

impl Request {
    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Request::GetCurrentPosition { .. } => "getCurrentPosition",
            Request::StartTracking { .. } => "startTracking",
            Request::StartTrackingCriteria { .. } => "startTrackingCriteria",
            Request::StopTracking { .. } => "stopTracking",
            Request::GetLastPosition { .. } => "getLastPosition",
            Request::GetGpsSatelliteData => "getGpsSatelliteData",
            Request::SendExtraCommand { .. } => "sendExtraCommand",
            Request::GetGeoCodeLocation { .. } => "getGeoCodeLocation",
            Request::GetReverseLocation { .. } => "getReverseLocation",
            Request::GetState { .. } => "getState",
            Request::SetGpsParameters { .. } => "setGpsParameters",
        }
    }

    /// Whether the reply stream stays open after the first reply.
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            Request::StartTracking { .. }
                | Request::StartTrackingCriteria { .. }
                | Request::GetGpsSatelliteData
        )
    }

    pub(super) fn criteria(&self) -> Option<Criteria> {
        match *self {
            Request::StartTrackingCriteria {
                accuracy,
                power,
                min_distance,
                min_interval_ms,
            } => Some(Criteria {
                accuracy,
                power,
                min_distance_m: min_distance,
                min_interval: min_interval_ms.map(std::time::Duration::from_millis),
            }),
            _ => None,
        }
    }
}
