//! Position handlers.
//!
//! A handler fronts one positioning source behind the [`PositionHandler`]
//! interface and owns its lifecycle:
//!
//! ```text
//! Idle ──start()──► Started ──get_position / start_tracking──► Busy(in-flight set)
//!  ▲                  │  ▲                                        │
//!  └─────stop()───────┘  └──────── fix delivered / disabled ──────┘
//! ```
//!
//! `stop()` is refused while anything is in flight, and a second request of
//! a kind that is already in flight is rejected rather than queued.
//!
//! Concrete handlers:
//!
//! - [`GpsHandler`] - GNSS receiver, satellite/NMEA streams, geofences, commands
//! - [`RadioHandler`] - One Wi-Fi, Cell or Hybrid source
//! - [`NetworkHandler`] - Composite over the radio sub-handlers
//! - [`LbsHandler`] - Geocoding through the web-service registry
//!
//! [`Handler`] selects among them by variant and [`HandlerTable`] maps every
//! [`HandlerType`] to the handler that serves it.

mod gps;
mod lbs;
mod lifecycle;
mod network;
mod radio;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use gps::{GpsCommand, GpsHandler, GpsHandlerConfig};
pub use lbs::LbsHandler;
pub use network::NetworkHandler;
pub use radio::RadioHandler;

use crate::error::ErrorCode;
use crate::plugin::{GeofenceEvent, NmeaSentence};
use crate::position::{Accuracy, FixResult, Position, SatelliteData};
use crate::wsp::{GeocodeQuery, GeocodeSink};

/// Identity of a position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerType {
    Gps,
    Wifi,
    Cell,
    /// Google-backed hybrid network source.
    Hybrid,
    /// Network positioning without a specific radio; served by Hybrid.
    Network,
    Lbs,
}

impl HandlerType {
    pub const ALL: [HandlerType; 6] = [
        HandlerType::Gps,
        HandlerType::Wifi,
        HandlerType::Cell,
        HandlerType::Hybrid,
        HandlerType::Network,
        HandlerType::Lbs,
    ];

    /// Stable lowercase key, used for logging and the position store.
    pub fn key(self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Wifi => "wifi",
            Self::Cell => "cell",
            Self::Hybrid => "hybrid",
            Self::Network => "network",
            Self::Lbs => "lbs",
        }
    }

    /// Served by the network composite.
    pub fn is_network(self) -> bool {
        matches!(self, Self::Wifi | Self::Cell | Self::Hybrid | Self::Network)
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for HandlerType {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|h| h.key().eq_ignore_ascii_case(s.trim()))
            .ok_or(ErrorCode::WrongParameter)
    }
}

/// Kinds of asynchronous operation a handler can have outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GetPosition,
    StartTracking,
    SatelliteData,
    NmeaData,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::GetPosition,
        Operation::StartTracking,
        Operation::SatelliteData,
        Operation::NmeaData,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::GetPosition => 1 << 0,
            Self::StartTracking => 1 << 1,
            Self::SatelliteData => 1 << 2,
            Self::NmeaData => 1 << 3,
        }
    }
}

/// Set of operations currently in flight. Each kind is present at most once.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct InFlight(u8);

impl InFlight {
    pub fn contains(self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    /// Add `op`. Returns false if it was already present.
    pub fn insert(&mut self, op: Operation) -> bool {
        if self.contains(op) {
            return false;
        }
        self.0 |= op.bit();
        true
    }

    /// Remove `op`. Returns false if it was not present.
    pub fn remove(&mut self, op: Operation) -> bool {
        if !self.contains(op) {
            return false;
        }
        self.0 &= !op.bit();
        true
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Observable lifecycle state of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Started,
    Busy(InFlight),
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Started => write!(f, "started"),
            Self::Busy(ops) => write!(f, "busy {:?}", ops),
        }
    }
}

/// A fix tagged with the handler that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub source: HandlerType,
    pub result: FixResult,
}

impl Fix {
    pub fn position(&self) -> Option<&Position> {
        self.result.as_ref().ok().map(|(p, _)| p)
    }
}

/// Receiver of fixes. Called from whatever thread the source reports on.
pub trait FixListener: Send + Sync {
    fn on_fix(&self, fix: Fix);
}

impl FixListener for mpsc::UnboundedSender<Fix> {
    fn on_fix(&self, fix: Fix) {
        if self.send(fix).is_err() {
            tracing::trace!("Fix receiver dropped");
        }
    }
}

pub type FixSink = Arc<dyn FixListener>;
pub type SatelliteSink = mpsc::UnboundedSender<SatelliteData>;
pub type NmeaSink = mpsc::UnboundedSender<NmeaSentence>;
pub type GeofenceSink = mpsc::UnboundedSender<GeofenceEvent>;

/// A [`FixSink`] feeding an unbounded channel.
pub fn fix_channel() -> (FixSink, mpsc::UnboundedReceiver<Fix>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

/// Common interface of every handler.
///
/// `handler` selects the sub-source on composites and is ignored elsewhere.
/// Passing `Some(sink)` enables an operation and `None` disables it;
/// disabling does not abort a platform request already issued, but any late
/// result is dropped.
pub trait PositionHandler: Send + Sync {
    fn kind(&self) -> HandlerType;

    /// Whether the underlying source exists.
    fn is_available(&self, handler: HandlerType) -> bool;

    fn state(&self, handler: HandlerType) -> HandlerState;

    /// Idempotent. Fails with `NotAvailable` when the source is absent.
    fn start(&self, handler: HandlerType) -> Result<(), ErrorCode>;

    /// Fails with `RequestInProgress` while anything is in flight.
    fn stop(&self, handler: HandlerType) -> Result<(), ErrorCode>;

    /// Request a single fix, delivered once on `sink`.
    fn get_position(&self, sink: Option<FixSink>, handler: HandlerType) -> Result<(), ErrorCode>;

    /// Deliver every fix on `sink` until disabled.
    fn start_tracking(&self, sink: Option<FixSink>, handler: HandlerType)
        -> Result<(), ErrorCode>;

    /// Most recent fix, from memory or the position store.
    fn get_last_position(&self, handler: HandlerType) -> FixResult;

    fn get_accuracy(&self, handler: HandlerType) -> Result<Accuracy, ErrorCode> {
        self.get_last_position(handler).map(|(_, accuracy)| accuracy)
    }

    fn get_satellite_data(&self, _sink: Option<SatelliteSink>) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn get_nmea_data(&self, _sink: Option<NmeaSink>) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn send_extra_command(&self, _command: &str) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn get_geocode(&self, _query: GeocodeQuery, _sink: Option<GeocodeSink>) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn get_reverse_geocode(
        &self,
        _position: Position,
        _sink: Option<GeocodeSink>,
    ) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }
}

/// Handler variant selected by source type.
pub enum Handler {
    Gps(GpsHandler),
    Radio(RadioHandler),
    Network(NetworkHandler),
    Lbs(LbsHandler),
}

impl Handler {
    fn as_dyn(&self) -> &dyn PositionHandler {
        match self {
            Handler::Gps(h) => h,
            Handler::Radio(h) => h,
            Handler::Network(h) => h,
            Handler::Lbs(h) => h,
        }
    }

    /// Handler types this handler serves.
    pub fn routes(&self) -> Vec<HandlerType> {
        match self {
            Handler::Gps(_) => vec![HandlerType::Gps],
            Handler::Radio(h) => vec![h.kind()],
            Handler::Network(_) => vec![
                HandlerType::Wifi,
                HandlerType::Cell,
                HandlerType::Hybrid,
                HandlerType::Network,
            ],
            Handler::Lbs(_) => vec![HandlerType::Lbs],
        }
    }

    pub fn as_gps(&self) -> Option<&GpsHandler> {
        match self {
            Handler::Gps(h) => Some(h),
            _ => None,
        }
    }
}

impl PositionHandler for Handler {
    fn kind(&self) -> HandlerType {
        self.as_dyn().kind()
    }

    fn is_available(&self, handler: HandlerType) -> bool {
        self.as_dyn().is_available(handler)
    }

    fn state(&self, handler: HandlerType) -> HandlerState {
        self.as_dyn().state(handler)
    }

    fn start(&self, handler: HandlerType) -> Result<(), ErrorCode> {
        self.as_dyn().start(handler)
    }

    fn stop(&self, handler: HandlerType) -> Result<(), ErrorCode> {
        self.as_dyn().stop(handler)
    }

    fn get_position(&self, sink: Option<FixSink>, handler: HandlerType) -> Result<(), ErrorCode> {
        self.as_dyn().get_position(sink, handler)
    }

    fn start_tracking(
        &self,
        sink: Option<FixSink>,
        handler: HandlerType,
    ) -> Result<(), ErrorCode> {
        self.as_dyn().start_tracking(sink, handler)
    }

    fn get_last_position(&self, handler: HandlerType) -> FixResult {
        self.as_dyn().get_last_position(handler)
    }

    fn get_accuracy(&self, handler: HandlerType) -> Result<Accuracy, ErrorCode> {
        self.as_dyn().get_accuracy(handler)
    }

    fn get_satellite_data(&self, sink: Option<SatelliteSink>) -> Result<(), ErrorCode> {
        self.as_dyn().get_satellite_data(sink)
    }

    fn get_nmea_data(&self, sink: Option<NmeaSink>) -> Result<(), ErrorCode> {
        self.as_dyn().get_nmea_data(sink)
    }

    fn send_extra_command(&self, command: &str) -> Result<(), ErrorCode> {
        self.as_dyn().send_extra_command(command)
    }

    fn get_geocode(&self, query: GeocodeQuery, sink: Option<GeocodeSink>) -> Result<(), ErrorCode> {
        self.as_dyn().get_geocode(query, sink)
    }

    fn get_reverse_geocode(
        &self,
        position: Position,
        sink: Option<GeocodeSink>,
    ) -> Result<(), ErrorCode> {
        self.as_dyn().get_reverse_geocode(position, sink)
    }
}

/// Routes every [`HandlerType`] to the handler serving it.
#[derive(Default, Clone)]
pub struct HandlerTable {
    routes: HashMap<HandlerType, Arc<Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for all of its routes, replacing earlier entries.
    pub fn insert(&mut self, handler: Handler) -> Arc<Handler> {
        let handler = Arc::new(handler);
        for route in handler.routes() {
            self.routes.insert(route, Arc::clone(&handler));
        }
        handler
    }

    pub fn get(&self, kind: HandlerType) -> Option<&Arc<Handler>> {
        self.routes.get(&kind)
    }

    /// Like [`get`](Self::get), mapping a missing route to `NotAvailable`.
    pub fn route(&self, kind: HandlerType) -> Result<&Arc<Handler>, ErrorCode> {
        self.get(kind).ok_or(ErrorCode::NotAvailable)
    }

    pub fn gps(&self) -> Option<&GpsHandler> {
        self.get(HandlerType::Gps).and_then(|h| h.as_gps())
    }

    pub fn is_available(&self, kind: HandlerType) -> bool {
        self.get(kind).is_some_and(|h| h.is_available(kind))
    }

    /// Every handler type with a loaded position source, in `ALL` order.
    pub fn available(&self) -> Vec<HandlerType> {
        HandlerType::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }

    /// Stop every started source, ignoring sources that are busy.
    pub fn stop_all(&self) {
        for (kind, handler) in &self.routes {
            if *kind == HandlerType::Network {
                // Same sub-handler as Hybrid.
                continue;
            }
            if let Err(e) = handler.stop(*kind) {
                tracing::debug!(handler = %kind, error = %e, "Handler not stopped at shutdown");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::plugin::{GnssPlugin, PluginCallbacks, PositionPlugin};
    use parking_lot::Mutex;

    /// Plugin that records calls and lets a test fire callbacks by hand.
    #[derive(Default)]
    pub(crate) struct ScriptedPlugin {
        pub callbacks: Mutex<Option<PluginCallbacks>>,
        pub calls: Mutex<Vec<String>>,
        pub fail_start: Mutex<Option<ErrorCode>>,
        pub injected_xtra: Mutex<Vec<Vec<u8>>>,
        pub injected_time: Mutex<Vec<crate::time_sync::NtpTime>>,
        /// Returned by stream disable calls when set.
        pub fail_disable: Mutex<Option<ErrorCode>>,
        /// Reported from inside `start_tracking(true)` when set.
        pub emit_on_track: Mutex<Option<(f64, f64)>>,
    }

    impl ScriptedPlugin {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn count(&self, call: &str) -> usize {
            self.calls.lock().iter().filter(|c| c.as_str() == call).count()
        }

        /// Fire a position callback as the platform would.
        pub fn emit(&self, result: FixResult) {
            let callbacks = self.callbacks.lock().clone();
            if let Some(cb) = callbacks {
                cb.position(result);
            }
        }

        pub fn emit_at(&self, lat: f64, lon: f64) {
            self.emit(Ok((Position::new(0, lat, lon).unwrap(), Accuracy::UNKNOWN)));
        }

        pub fn handle(&self) -> Option<PluginCallbacks> {
            self.callbacks.lock().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }

        fn disable_result(&self, enable: bool) -> Result<(), ErrorCode> {
            match *self.fail_disable.lock() {
                Some(e) if !enable => Err(e),
                _ => Ok(()),
            }
        }
    }

    impl PositionPlugin for ScriptedPlugin {
        fn name(&self) -> &str {
            "scripted"
        }

        fn start(&self, callbacks: PluginCallbacks) -> Result<(), ErrorCode> {
            self.record("start");
            if let Some(e) = *self.fail_start.lock() {
                return Err(e);
            }
            *self.callbacks.lock() = Some(callbacks);
            Ok(())
        }

        fn stop(&self) -> Result<(), ErrorCode> {
            self.record("stop");
            Ok(())
        }

        fn get_position(&self) -> Result<(), ErrorCode> {
            self.record("get_position");
            Ok(())
        }

        fn start_tracking(&self, enable: bool) -> Result<(), ErrorCode> {
            self.record(format!("start_tracking({})", enable));
            let immediate = *self.emit_on_track.lock();
            if let (true, Some((lat, lon))) = (enable, immediate) {
                self.emit_at(lat, lon);
            }
            Ok(())
        }
    }

    impl GnssPlugin for ScriptedPlugin {
        fn get_satellite_data(&self, enable: bool) -> Result<(), ErrorCode> {
            self.record(format!("get_satellite_data({})", enable));
            self.disable_result(enable)
        }

        fn send_extra_command(&self, command: &str) -> Result<(), ErrorCode> {
            self.record(format!("extra:{}", command));
            Ok(())
        }

        fn set_position_mode(
            &self,
            mode: crate::plugin::PositionMode,
            fix_interval: std::time::Duration,
        ) -> Result<(), ErrorCode> {
            self.record(format!("mode:{}:{}", mode, fix_interval.as_millis()));
            Ok(())
        }

        fn get_nmea_data(&self, enable: bool) -> Result<(), ErrorCode> {
            self.record(format!("get_nmea_data({})", enable));
            self.disable_result(enable)
        }

        fn inject_time(&self, time: &crate::time_sync::NtpTime) -> Result<(), ErrorCode> {
            self.injected_time.lock().push(*time);
            Ok(())
        }

        fn inject_xtra_data(&self, data: &[u8]) -> Result<(), ErrorCode> {
            self.injected_xtra.lock().push(data.to_vec());
            Ok(())
        }

        fn add_geofence(&self, area: &crate::plugin::GeofenceArea) -> Result<(), ErrorCode> {
            self.record(format!("add_geofence({})", area.id));
            Ok(())
        }

        fn remove_geofence(&self, id: i32) -> Result<(), ErrorCode> {
            self.record(format!("remove_geofence({})", id));
            Ok(())
        }

        fn pause_geofence(&self, id: i32) -> Result<(), ErrorCode> {
            self.record(format!("pause_geofence({})", id));
            Ok(())
        }

        fn resume_geofence(&self, id: i32) -> Result<(), ErrorCode> {
            self.record(format!("resume_geofence({})", id));
            Ok(())
        }
    }

    #[test]
    fn test_handler_type_parse() {
        assert_eq!("WIFI".parse::<HandlerType>(), Ok(HandlerType::Wifi));
        assert_eq!("bogus".parse::<HandlerType>(), Err(ErrorCode::WrongParameter));
        assert!(HandlerType::Network.is_network());
        assert!(!HandlerType::Gps.is_network());
    }

    #[test]
    fn test_in_flight_set() {
        let mut set = InFlight::default();
        assert!(set.insert(Operation::GetPosition));
        assert!(!set.insert(Operation::GetPosition));
        assert!(set.insert(Operation::StartTracking));
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Operation::GetPosition, Operation::StartTracking]
        );

        assert!(set.remove(Operation::GetPosition));
        assert!(!set.remove(Operation::GetPosition));
        assert!(set.remove(Operation::StartTracking));
        assert!(set.is_empty());
    }

    #[test]
    fn test_table_routes_network_types() {
        let mut table = HandlerTable::new();
        table.insert(Handler::Network(NetworkHandler::new(None, None, None)));

        for kind in [
            HandlerType::Wifi,
            HandlerType::Cell,
            HandlerType::Hybrid,
            HandlerType::Network,
        ] {
            assert!(table.get(kind).is_some());
            assert!(!table.is_available(kind));
        }
        assert_eq!(table.route(HandlerType::Gps).err(), Some(ErrorCode::NotAvailable));
        assert!(table.gps().is_none());
    }

    #[test]
    fn test_geocode_not_applicable_on_position_handlers() {
        let plugin = ScriptedPlugin::new();
        let radio = RadioHandler::new(HandlerType::Wifi, Some(plugin.clone()), None);
        let (tx, _rx) = crate::wsp::geocode_channel();

        assert_eq!(
            radio.get_geocode(GeocodeQuery::new("x"), Some(tx)),
            Err(ErrorCode::NotApplicableToThisHandler)
        );
        assert!(plugin.calls().is_empty());
    }
}
