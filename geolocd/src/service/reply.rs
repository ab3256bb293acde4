//! Reply envelope and body shapes.

use serde::Serialize;

use crate::error::ErrorCode;
use crate::handler::{Fix, HandlerState, HandlerType, Operation};
use crate::position::{Accuracy, Position, SatelliteData};
use crate::wsp::{Address, GeocodeResult};

/// One reply on a client stream.
///
/// `errorCode`/`errorText` are present only when `returnValue` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub return_value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(flatten)]
    pub body: Option<ReplyBody>,
}

/// Method-specific reply fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Position(PositionBody),
    Satellites(SatelliteBody),
    Geocode(GeocodeBody),
    State(StateBody),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionBody {
    pub handler: HandlerType,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb: Option<f64>,
    pub horiz_accuracy: f64,
    pub vert_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteEntry {
    pub prn: u16,
    pub snr: f64,
    pub elevation: f64,
    pub azimuth: f64,
    pub used_in_fix: bool,
    pub has_almanac: bool,
    pub has_ephemeris: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteBody {
    pub visible_satellites: usize,
    pub used_satellites: usize,
    pub satellites: Vec<SatelliteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeBody {
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBody {
    pub handler: HandlerType,
    pub available: bool,
    pub state: &'static str,
    pub in_flight: Vec<Operation>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            return_value: true,
            error_code: None,
            error_text: None,
            body: None,
        }
    }

    pub fn error(error: ErrorCode) -> Self {
        Self {
            return_value: false,
            error_code: Some(error.code()),
            error_text: Some(error.text()),
            body: None,
        }
    }

    fn with_body(body: ReplyBody) -> Self {
        Self {
            body: Some(body),
            ..Self::ok()
        }
    }

    pub fn from_result(result: Result<(), ErrorCode>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::error(e),
        }
    }

    pub fn position(handler: HandlerType, position: &Position, accuracy: &Accuracy) -> Self {
        Self::with_body(ReplyBody::Position(PositionBody {
            handler,
            timestamp: position.timestamp(),
            latitude: position.latitude(),
            longitude: position.longitude(),
            altitude: position.altitude(),
            velocity: position.speed(),
            heading: position.direction(),
            climb: position.climb(),
            horiz_accuracy: accuracy.horizontal,
            vert_accuracy: accuracy.vertical,
        }))
    }

    pub fn from_fix(fix: &Fix) -> Self {
        match &fix.result {
            Ok((position, accuracy)) => Self::position(fix.source, position, accuracy),
            Err(e) => Self::error(*e),
        }
    }

    pub fn satellites(data: &SatelliteData) -> Self {
        let satellites = data
            .satellites()
            .iter()
            .map(|s| SatelliteEntry {
                prn: s.prn,
                snr: s.snr,
                elevation: s.elevation,
                azimuth: s.azimuth,
                used_in_fix: s.used,
                has_almanac: s.has_almanac,
                has_ephemeris: s.has_ephemeris,
            })
            .collect();
        Self::with_body(ReplyBody::Satellites(SatelliteBody {
            visible_satellites: data.num_satellites_visible(),
            used_satellites: data.num_satellite_used(),
            satellites,
        }))
    }

    pub fn geocode(result: &GeocodeResult) -> Self {
        Self::with_body(ReplyBody::Geocode(GeocodeBody {
            address: result.address.clone(),
            latitude: result.position.map(|p| p.latitude()),
            longitude: result.position.map(|p| p.longitude()),
        }))
    }

    pub fn state(handler: HandlerType, available: bool, state: HandlerState) -> Self {
        let (name, in_flight) = match state {
            HandlerState::Idle => ("idle", Vec::new()),
            HandlerState::Started => ("started", Vec::new()),
            HandlerState::Busy(ops) => ("busy", ops.iter().collect()),
        };
        Self::with_body(ReplyBody::State(StateBody {
            handler,
            available,
            state: name,
            in_flight,
        }))
    }

    pub fn is_error(&self) -> bool {
        !self.return_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::InFlight;
    use crate::position::{AccuracyLevel, SatelliteInfo};
    use serde_json::json;

    #[test]
    fn test_error_reply_shape() {
        let value = serde_json::to_value(Reply::error(ErrorCode::DuplicateRequest)).unwrap();
        assert_eq!(value["returnValue"], json!(false));
        assert_eq!(value["errorCode"], json!(7));
        assert!(value["errorText"].is_string());
    }

    #[test]
    fn test_ok_reply_has_no_error_fields() {
        let value = serde_json::to_value(Reply::ok()).unwrap();
        assert_eq!(value, json!({"returnValue": true}));
    }

    #[test]
    fn test_position_reply_fields() {
        let position = Position::new(1_700_000_000_000, 37.1, -122.1)
            .unwrap()
            .with_altitude(12.0);
        let accuracy = Accuracy::new(AccuracyLevel::Detailed, 25.0, 40.0);
        let fix = Fix {
            source: HandlerType::Wifi,
            result: Ok((position, accuracy)),
        };

        let value = serde_json::to_value(Reply::from_fix(&fix)).unwrap();
        assert_eq!(value["returnValue"], json!(true));
        assert_eq!(value["handler"], json!("wifi"));
        assert_eq!(value["latitude"], json!(37.1));
        assert_eq!(value["altitude"], json!(12.0));
        assert_eq!(value["horizAccuracy"], json!(25.0));
        assert!(value.get("velocity").is_none());
    }

    #[test]
    fn test_error_fix_reply() {
        let fix = Fix {
            source: HandlerType::Gps,
            result: Err(ErrorCode::Timeout),
        };
        let reply = Reply::from_fix(&fix);
        assert!(reply.is_error());
        assert_eq!(reply.error_code, Some(ErrorCode::Timeout.code()));
    }

    #[test]
    fn test_satellite_reply_counts() {
        let data = SatelliteData::from_satellites(vec![
            SatelliteInfo {
                prn: 3,
                used: true,
                ..SatelliteInfo::default()
            },
            SatelliteInfo {
                prn: 9,
                ..SatelliteInfo::default()
            },
        ]);

        let value = serde_json::to_value(Reply::satellites(&data)).unwrap();
        assert_eq!(value["visibleSatellites"], json!(2));
        assert_eq!(value["usedSatellites"], json!(1));
        assert_eq!(value["satellites"][0]["usedInFix"], json!(true));
    }

    #[test]
    fn test_state_reply_lists_in_flight() {
        let mut ops = InFlight::default();
        ops.insert(Operation::StartTracking);

        let value = serde_json::to_value(Reply::state(
            HandlerType::Cell,
            true,
            HandlerState::Busy(ops),
        ))
        .unwrap();
        assert_eq!(value["state"], json!("busy"));
        assert_eq!(value["inFlight"], json!(["start_tracking"]));
    }
}
