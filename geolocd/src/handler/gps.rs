//! GNSS receiver handler.
//!
//! Beyond the common position operations this handler streams satellite
//! and NMEA data, manages geofences, serves the engine's time and XTRA
//! assistance requests and accepts numbered commands through a
//! [`DispatchTable`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use super::lifecycle::HandlerCore;
use super::{
    FixSink, GeofenceSink, HandlerState, HandlerType, NmeaSink, Operation, PositionHandler,
    SatelliteSink,
};
use crate::config::GpsParameters;
use crate::dispatch::DispatchTable;
use crate::error::ErrorCode;
use crate::http::{HttpCallback, HttpRequest, HttpTransport};
use crate::plugin::{
    GeofenceArea, GeofenceEvent, GnssPlugin, NmeaSentence, PluginListener, PositionMode,
};
use crate::position::{FixResult, SatelliteData};
use crate::store::PositionStore;
use crate::time_sync::NtpClient;

/// Default interval between tracking fixes.
pub const DEFAULT_FIX_INTERVAL: Duration = Duration::from_secs(1);

/// Commands accepted by [`GpsHandler::handle_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GpsCommand {
    Enable = 1,
    Disable = 2,
    /// `{"interval": <ms>}`
    PeriodicUpdate = 3,
    /// `{"command": "<text>"}`
    ExtraCommand = 4,
    /// A geofence area: `{"id", "latitude", "longitude", "radius"}`
    AddGeofence = 5,
    /// `{"id": <id>}`, as are the pause and resume commands.
    RemoveGeofence = 6,
    PauseGeofence = 7,
    ResumeGeofence = 8,
}

impl TryFrom<u8> for GpsCommand {
    type Error = ErrorCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Enable,
            2 => Self::Disable,
            3 => Self::PeriodicUpdate,
            4 => Self::ExtraCommand,
            5 => Self::AddGeofence,
            6 => Self::RemoveGeofence,
            7 => Self::PauseGeofence,
            8 => Self::ResumeGeofence,
            _ => return Err(ErrorCode::WrongParameter),
        })
    }
}

/// Construction parameters for [`GpsHandler`].
#[derive(Clone)]
pub struct GpsHandlerConfig {
    /// Values from the GPS parameter file. They take precedence over the
    /// defaults below.
    pub parameters: GpsParameters,
    pub position_mode: PositionMode,
    pub fix_interval: Duration,
    pub store: Option<Arc<dyn PositionStore>>,
    /// Used for XTRA downloads. Without it XTRA requests are ignored.
    pub transport: Option<Arc<dyn HttpTransport>>,
    pub ntp: NtpClient,
}

impl Default for GpsHandlerConfig {
    fn default() -> Self {
        Self {
            parameters: GpsParameters::default(),
            position_mode: PositionMode::default(),
            fix_interval: DEFAULT_FIX_INTERVAL,
            store: None,
            transport: None,
            ntp: NtpClient::default(),
        }
    }
}

struct Geofence {
    area: GeofenceArea,
    paused: bool,
}

#[derive(Default)]
struct GpsExtras {
    satellite_sink: Option<SatelliteSink>,
    nmea_sink: Option<NmeaSink>,
    geofence_sink: Option<GeofenceSink>,
    geofences: BTreeMap<i32, Geofence>,
}

struct GpsInner {
    core: HandlerCore,
    plugin: Option<Arc<dyn GnssPlugin>>,
    settings: Mutex<(PositionMode, Duration)>,
    extras: Mutex<GpsExtras>,
    parameters: GpsParameters,
    transport: Option<Arc<dyn HttpTransport>>,
    ntp: NtpClient,
}

impl GpsInner {
    fn plugin(&self) -> Option<&dyn GnssPlugin> {
        self.plugin.as_deref()
    }

    fn require_plugin(&self) -> Result<&dyn GnssPlugin, ErrorCode> {
        self.plugin().ok_or(ErrorCode::NotAvailable)
    }

    fn push_position_mode(&self) -> Result<(), ErrorCode> {
        let plugin = self.require_plugin()?;
        let (mode, interval) = *self.settings.lock();
        plugin.set_position_mode(mode, interval).inspect(|_| {
            tracing::debug!(
                mode = %mode,
                fix_interval_ms = interval.as_millis() as u64,
                "GPS position mode set"
            );
        })
    }

    fn set_fix_interval(&self, interval: Duration) -> Result<(), ErrorCode> {
        if interval.is_zero() {
            return Err(ErrorCode::WrongParameter);
        }
        self.settings.lock().1 = interval;
        if self.core.is_started() {
            self.push_position_mode()?;
        }
        Ok(())
    }

    fn add_geofence(&self, area: GeofenceArea) -> Result<(), ErrorCode> {
        if !(-90.0..=90.0).contains(&area.latitude)
            || !(-180.0..=180.0).contains(&area.longitude)
            || !(area.radius_m > 0.0)
        {
            return Err(ErrorCode::WrongParameter);
        }
        let plugin = self.require_plugin()?;
        if self.extras.lock().geofences.contains_key(&area.id) {
            return Err(ErrorCode::DuplicateRequest);
        }

        plugin.add_geofence(&area)?;
        self.extras
            .lock()
            .geofences
            .insert(area.id, Geofence { area, paused: false });
        tracing::info!(id = area.id, radius_m = area.radius_m, "Geofence added");
        Ok(())
    }

    fn remove_geofence(&self, id: i32) -> Result<(), ErrorCode> {
        let plugin = self.require_plugin()?;
        if !self.extras.lock().geofences.contains_key(&id) {
            return Err(ErrorCode::WrongParameter);
        }
        plugin.remove_geofence(id)?;
        self.extras.lock().geofences.remove(&id);
        tracing::info!(id, "Geofence removed");
        Ok(())
    }

    fn set_geofence_paused(&self, id: i32, paused: bool) -> Result<(), ErrorCode> {
        let plugin = self.require_plugin()?;
        if !self.extras.lock().geofences.contains_key(&id) {
            return Err(ErrorCode::WrongParameter);
        }
        if paused {
            plugin.pause_geofence(id)?;
        } else {
            plugin.resume_geofence(id)?;
        }
        if let Some(fence) = self.extras.lock().geofences.get_mut(&id) {
            fence.paused = paused;
        }
        tracing::debug!(id, paused, "Geofence state changed");
        Ok(())
    }

    fn start(self: &Arc<Self>) -> Result<(), ErrorCode> {
        let listener: Arc<dyn PluginListener> = self.clone();
        if self.core.start(self.plugin(), &listener)? {
            if let Err(e) = self.push_position_mode() {
                tracing::debug!(error = %e, "Plugin kept its own position mode");
            }
        }
        Ok(())
    }
}

fn geofence_id(data: &Value) -> Option<i32> {
    data.get("id")
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
}

/// Try each XTRA server in order until one download succeeds.
fn fetch_xtra(
    transport: Arc<dyn HttpTransport>,
    plugin: Arc<dyn GnssPlugin>,
    servers: Arc<[String]>,
    index: usize,
) {
    let Some(url) = servers.get(index).cloned() else {
        tracing::warn!(servers = servers.len(), "XTRA download failed on every server");
        return;
    };

    let retry_transport = Arc::clone(&transport);
    let source = url.clone();
    let on_complete: HttpCallback = Box::new(move |result| match result {
        Ok(data) => match plugin.inject_xtra_data(&data) {
            Ok(()) => tracing::info!(url = %source, bytes = data.len(), "XTRA data injected"),
            Err(e) => tracing::warn!(url = %source, error = %e, "XTRA injection failed"),
        },
        Err(e) => {
            tracing::debug!(url = %source, error = %e, "XTRA download failed, trying next server");
            fetch_xtra(retry_transport, plugin, servers, index + 1);
        }
    });

    if let Err(e) = transport.submit("xtra", HttpRequest::get(url), on_complete) {
        tracing::warn!(error = %e, "Could not submit XTRA download");
    }
}

impl PluginListener for GpsInner {
    fn on_position(&self, result: FixResult) {
        self.core.deliver(result);
    }

    fn on_satellites(&self, data: SatelliteData) {
        if !self.core.is_in_flight(Operation::SatelliteData) {
            return;
        }
        if let Some(sink) = self.extras.lock().satellite_sink.as_ref() {
            let _ = sink.send(data);
        }
    }

    fn on_nmea(&self, sentence: NmeaSentence) {
        if !self.core.is_in_flight(Operation::NmeaData) {
            return;
        }
        if let Some(sink) = self.extras.lock().nmea_sink.as_ref() {
            let _ = sink.send(sentence);
        }
    }

    fn on_time_request(&self) {
        let (Some(server), Some(plugin)) = (self.parameters.ntp_server.clone(), self.plugin.clone())
        else {
            tracing::debug!("Time request ignored, no NTP server configured");
            return;
        };

        let label = server.clone();
        let result = self.ntp.request_time(&server, move |result| match result {
            Ok(time) => {
                if let Err(e) = plugin.inject_time(&time) {
                    tracing::warn!(error = %e, "Time injection failed");
                }
            }
            Err(e) => tracing::warn!(server = %label, error = %e, "Time request failed"),
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Could not start NTP request");
        }
    }

    fn on_xtra_request(&self) {
        let (Some(transport), Some(plugin)) = (self.transport.clone(), self.plugin.clone()) else {
            tracing::debug!("XTRA request ignored, no transport");
            return;
        };
        if self.parameters.xtra_servers.is_empty() {
            tracing::debug!("XTRA request ignored, no servers configured");
            return;
        }
        let servers: Arc<[String]> = self.parameters.xtra_servers.clone().into();
        fetch_xtra(transport, plugin, servers, 0);
    }

    fn on_geofence(&self, event: GeofenceEvent) {
        let extras = self.extras.lock();
        match extras.geofences.get(&event.id) {
            Some(fence) if !fence.paused => {}
            Some(_) => return,
            None => {
                tracing::debug!(id = event.id, "Event for unknown geofence");
                return;
            }
        }
        if let Some(sink) = extras.geofence_sink.as_ref() {
            tracing::debug!(id = event.id, transition = ?event.transition, "Geofence transition");
            let _ = sink.send(event);
        }
    }
}

/// GNSS handler.
pub struct GpsHandler {
    inner: Arc<GpsInner>,
    commands: DispatchTable<GpsHandler, GpsCommand>,
}

impl GpsHandler {
    pub fn new(plugin: Option<Arc<dyn GnssPlugin>>, config: GpsHandlerConfig) -> Self {
        let mode = config
            .parameters
            .position_mode
            .unwrap_or(config.position_mode);
        let interval = config
            .parameters
            .fix_interval
            .unwrap_or(config.fix_interval);

        let inner = Arc::new(GpsInner {
            core: HandlerCore::new(HandlerType::Gps, config.store),
            plugin,
            settings: Mutex::new((mode, interval)),
            extras: Mutex::new(GpsExtras::default()),
            parameters: config.parameters,
            transport: config.transport,
            ntp: config.ntp,
        });

        Self {
            inner,
            commands: Self::command_table(),
        }
    }

    fn command_table() -> DispatchTable<GpsHandler, GpsCommand> {
        let entries: [(GpsCommand, fn(&GpsHandler, &Value) -> bool); 8] = [
            (GpsCommand::Enable, Self::cmd_enable),
            (GpsCommand::Disable, Self::cmd_disable),
            (GpsCommand::PeriodicUpdate, Self::cmd_periodic_update),
            (GpsCommand::ExtraCommand, Self::cmd_extra_command),
            (GpsCommand::AddGeofence, Self::cmd_add_geofence),
            (GpsCommand::RemoveGeofence, Self::cmd_remove_geofence),
            (GpsCommand::PauseGeofence, Self::cmd_pause_geofence),
            (GpsCommand::ResumeGeofence, Self::cmd_resume_geofence),
        ];

        let mut table = DispatchTable::new("gps");
        for (opcode, method) in entries {
            let registered = table.register(opcode, method);
            debug_assert!(registered.is_ok(), "duplicate GPS opcode {:?}", opcode);
            if let Err(e) = registered {
                tracing::error!(error = %e, "GPS command table misconfigured");
            }
        }
        table
    }

    /// Run the command registered for `opcode`. Returns false for unknown
    /// opcodes, malformed data, or a failed command.
    pub fn handle_command(&self, opcode: u8, data: &Value) -> bool {
        match GpsCommand::try_from(opcode) {
            Ok(command) => self.commands.dispatch(self, command, data),
            Err(_) => {
                tracing::debug!(opcode, "Unknown GPS command");
                false
            }
        }
    }

    pub fn parameters(&self) -> &GpsParameters {
        &self.inner.parameters
    }

    pub fn position_mode(&self) -> (PositionMode, Duration) {
        *self.inner.settings.lock()
    }

    pub fn set_fix_interval(&self, interval: Duration) -> Result<(), ErrorCode> {
        self.inner.set_fix_interval(interval)
    }

    pub fn add_geofence(&self, area: GeofenceArea) -> Result<(), ErrorCode> {
        self.inner.add_geofence(area)
    }

    pub fn remove_geofence(&self, id: i32) -> Result<(), ErrorCode> {
        self.inner.remove_geofence(id)
    }

    pub fn pause_geofence(&self, id: i32) -> Result<(), ErrorCode> {
        self.inner.set_geofence_paused(id, true)
    }

    pub fn resume_geofence(&self, id: i32) -> Result<(), ErrorCode> {
        self.inner.set_geofence_paused(id, false)
    }

    /// Registered geofences and whether each is paused.
    pub fn geofences(&self) -> Vec<(GeofenceArea, bool)> {
        self.inner
            .extras
            .lock()
            .geofences
            .values()
            .map(|f| (f.area, f.paused))
            .collect()
    }

    /// Where geofence transitions are delivered. `None` discards them.
    pub fn set_geofence_sink(&self, sink: Option<GeofenceSink>) {
        self.inner.extras.lock().geofence_sink = sink;
    }

    fn cmd_enable(&self, _data: &Value) -> bool {
        self.inner.start().is_ok()
    }

    fn cmd_disable(&self, _data: &Value) -> bool {
        self.inner.core.stop(self.inner.plugin()).is_ok()
    }

    fn cmd_periodic_update(&self, data: &Value) -> bool {
        data.get("interval")
            .and_then(Value::as_u64)
            .is_some_and(|ms| self.set_fix_interval(Duration::from_millis(ms)).is_ok())
    }

    fn cmd_extra_command(&self, data: &Value) -> bool {
        data.get("command")
            .and_then(Value::as_str)
            .is_some_and(|command| self.send_extra_command(command).is_ok())
    }

    fn cmd_add_geofence(&self, data: &Value) -> bool {
        GeofenceArea::deserialize(data).is_ok_and(|area| self.add_geofence(area).is_ok())
    }

    fn cmd_remove_geofence(&self, data: &Value) -> bool {
        geofence_id(data).is_some_and(|id| self.remove_geofence(id).is_ok())
    }

    fn cmd_pause_geofence(&self, data: &Value) -> bool {
        geofence_id(data).is_some_and(|id| self.pause_geofence(id).is_ok())
    }

    fn cmd_resume_geofence(&self, data: &Value) -> bool {
        geofence_id(data).is_some_and(|id| self.resume_geofence(id).is_ok())
    }
}

impl PositionHandler for GpsHandler {
    fn kind(&self) -> HandlerType {
        HandlerType::Gps
    }

    fn is_available(&self, _handler: HandlerType) -> bool {
        self.inner.plugin.is_some()
    }

    fn state(&self, _handler: HandlerType) -> HandlerState {
        self.inner.core.state()
    }

    fn start(&self, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.inner.start()
    }

    fn stop(&self, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.inner.core.stop(self.inner.plugin()).map(|_| ())
    }

    fn get_position(&self, sink: Option<FixSink>, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.inner.core.get_position(self.inner.plugin(), sink)
    }

    fn start_tracking(
        &self,
        sink: Option<FixSink>,
        _handler: HandlerType,
    ) -> Result<(), ErrorCode> {
        self.inner.core.start_tracking(self.inner.plugin(), sink)
    }

    fn get_last_position(&self, _handler: HandlerType) -> FixResult {
        self.inner.core.last_position()
    }

    fn get_satellite_data(&self, sink: Option<SatelliteSink>) -> Result<(), ErrorCode> {
        let core = &self.inner.core;
        let Some(sink) = sink else {
            self.inner.extras.lock().satellite_sink = None;
            if core.release(Operation::SatelliteData) {
                if let Some(plugin) = self.inner.plugin() {
                    if let Err(e) = plugin.get_satellite_data(false) {
                        tracing::warn!(error = %e, "Failed to disable satellite reports");
                    }
                }
            }
            return Ok(());
        };

        let plugin = self.inner.require_plugin()?;
        core.begin(Operation::SatelliteData)?;
        self.inner.extras.lock().satellite_sink = Some(sink);
        plugin.get_satellite_data(true).inspect_err(|_| {
            core.release(Operation::SatelliteData);
            self.inner.extras.lock().satellite_sink = None;
        })
    }

    fn get_nmea_data(&self, sink: Option<NmeaSink>) -> Result<(), ErrorCode> {
        let core = &self.inner.core;
        let Some(sink) = sink else {
            self.inner.extras.lock().nmea_sink = None;
            if core.release(Operation::NmeaData) {
                if let Some(plugin) = self.inner.plugin() {
                    if let Err(e) = plugin.get_nmea_data(false) {
                        tracing::warn!(error = %e, "Failed to disable NMEA reports");
                    }
                }
            }
            return Ok(());
        };

        let plugin = self.inner.require_plugin()?;
        core.begin(Operation::NmeaData)?;
        self.inner.extras.lock().nmea_sink = Some(sink);
        plugin.get_nmea_data(true).inspect_err(|_| {
            core.release(Operation::NmeaData);
            self.inner.extras.lock().nmea_sink = None;
        })
    }

    fn send_extra_command(&self, command: &str) -> Result<(), ErrorCode> {
        if command.trim().is_empty() {
            return Err(ErrorCode::WrongParameter);
        }
        let plugin = self.inner.require_plugin()?;
        tracing::debug!(command, "Sending GPS extra command");
        plugin.send_extra_command(command)
    }
}

impl Drop for GpsHandler {
    fn drop(&mut self) {
        self.commands.unregister_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::fix_channel;
    use crate::handler::tests::ScriptedPlugin;
    use crate::http::tests::MockAsyncHttpClient;
    use crate::http::{HttpError, HttpTransactionManager};
    use crate::plugin::GeofenceTransition;
    use crate::position::SatelliteInfo;
    use crate::wsp::{geocode_channel, GeocodeQuery};
    use serde_json::json;

    fn gps_with(config: GpsHandlerConfig) -> (GpsHandler, Arc<ScriptedPlugin>) {
        let plugin = ScriptedPlugin::new();
        let handler = GpsHandler::new(Some(plugin.clone()), config);
        (handler, plugin)
    }

    fn gps() -> (GpsHandler, Arc<ScriptedPlugin>) {
        gps_with(GpsHandlerConfig::default())
    }

    fn area(id: i32) -> GeofenceArea {
        GeofenceArea {
            id,
            latitude: 37.1,
            longitude: -122.1,
            radius_m: 150.0,
        }
    }

    #[test]
    fn test_command_opcodes() {
        assert_eq!(GpsCommand::try_from(3), Ok(GpsCommand::PeriodicUpdate));
        assert_eq!(GpsCommand::PeriodicUpdate as u8, 3);
        assert_eq!(GpsCommand::try_from(0), Err(ErrorCode::WrongParameter));
        assert_eq!(GpsCommand::try_from(9), Err(ErrorCode::WrongParameter));
    }

    #[test]
    fn test_every_command_is_registered() {
        let (gps, _plugin) = gps();
        assert_eq!(gps.commands.len(), 8);
        for opcode in 1..=8u8 {
            let command = GpsCommand::try_from(opcode).unwrap();
            assert!(gps.commands.is_registered(command));
        }
    }

    #[test]
    fn test_start_pushes_position_mode() {
        let mut config = GpsHandlerConfig::default();
        config.parameters.position_mode = Some(PositionMode::MsBased);
        config.fix_interval = Duration::from_millis(500);
        let (gps, plugin) = gps_with(config);

        gps.start(HandlerType::Gps).unwrap();
        gps.start(HandlerType::Gps).unwrap();
        assert_eq!(plugin.calls(), vec!["start", "mode:ms_based:500"]);
    }

    #[test]
    fn test_enable_disable_commands() {
        let (gps, plugin) = gps();
        assert!(gps.handle_command(GpsCommand::Enable as u8, &Value::Null));
        assert_eq!(gps.state(HandlerType::Gps), HandlerState::Started);

        assert!(gps.handle_command(GpsCommand::Disable as u8, &Value::Null));
        assert_eq!(gps.state(HandlerType::Gps), HandlerState::Idle);
        assert_eq!(plugin.count("stop"), 1);
        assert!(!gps.handle_command(42, &Value::Null));
    }

    #[test]
    fn test_periodic_update_command() {
        let (gps, plugin) = gps();
        gps.start(HandlerType::Gps).unwrap();

        assert!(gps.handle_command(3, &json!({"interval": 2000})));
        assert_eq!(gps.position_mode().1, Duration::from_secs(2));
        assert!(plugin.calls().contains(&"mode:standalone:2000".to_string()));

        assert!(!gps.handle_command(3, &json!({"interval": 0})));
        assert!(!gps.handle_command(3, &json!({})));
    }

    #[test]
    fn test_extra_command() {
        let (gps, plugin) = gps();
        assert!(gps.handle_command(4, &json!({"command": "delete_aiding_data"})));
        assert!(!gps.handle_command(4, &json!({"command": 5})));
        assert_eq!(gps.send_extra_command("  "), Err(ErrorCode::WrongParameter));
        assert_eq!(plugin.count("extra:delete_aiding_data"), 1);
    }

    #[test]
    fn test_geofence_lifecycle() {
        let (gps, plugin) = gps();
        let (sink, mut rx) = tokio::sync::mpsc::unbounded_channel();
        gps.set_geofence_sink(Some(sink));

        assert!(gps.handle_command(
            5,
            &json!({"id": 7, "latitude": 37.1, "longitude": -122.1, "radius": 150.0})
        ));
        assert_eq!(gps.add_geofence(area(7)), Err(ErrorCode::DuplicateRequest));
        assert_eq!(gps.geofences(), vec![(area(7), false)]);

        let callbacks = {
            gps.start(HandlerType::Gps).unwrap();
            plugin.handle().unwrap()
        };
        let event = |id| GeofenceEvent {
            id,
            transition: GeofenceTransition::Entered,
            position: None,
        };

        callbacks.geofence(event(7));
        assert_eq!(rx.try_recv().unwrap().id, 7);

        assert!(gps.handle_command(7, &json!({"id": 7})));
        callbacks.geofence(event(7));
        assert!(rx.try_recv().is_err());

        assert!(gps.handle_command(8, &json!({"id": 7})));
        callbacks.geofence(event(99));
        assert!(rx.try_recv().is_err());

        assert!(gps.handle_command(6, &json!({"id": 7})));
        assert!(!gps.handle_command(6, &json!({"id": 7})));
        assert!(gps.geofences().is_empty());
        assert_eq!(
            plugin
                .calls()
                .into_iter()
                .filter(|c| c.contains("geofence"))
                .collect::<Vec<_>>(),
            vec![
                "add_geofence(7)",
                "pause_geofence(7)",
                "resume_geofence(7)",
                "remove_geofence(7)"
            ]
        );
    }

    #[test]
    fn test_invalid_geofence() {
        let (gps, _plugin) = gps();
        let mut bad = area(1);
        bad.latitude = 91.0;
        assert_eq!(gps.add_geofence(bad), Err(ErrorCode::WrongParameter));
        bad = area(1);
        bad.radius_m = 0.0;
        assert_eq!(gps.add_geofence(bad), Err(ErrorCode::WrongParameter));
        assert_eq!(gps.pause_geofence(1), Err(ErrorCode::WrongParameter));
    }

    #[test]
    fn test_satellite_stream() {
        let (gps, plugin) = gps();
        gps.start(HandlerType::Gps).unwrap();
        let (sink, mut rx) = tokio::sync::mpsc::unbounded_channel();

        gps.get_satellite_data(Some(sink.clone())).unwrap();
        assert_eq!(
            gps.get_satellite_data(Some(sink)),
            Err(ErrorCode::DuplicateRequest)
        );

        let callbacks = plugin.handle().unwrap();
        let sats = SatelliteData::from_satellites(vec![SatelliteInfo {
            prn: 12,
            used: true,
            ..SatelliteInfo::default()
        }]);
        callbacks.satellites(sats.clone());
        assert_eq!(rx.try_recv().unwrap().num_satellite_used(), 1);

        assert_eq!(gps.stop(HandlerType::Gps), Err(ErrorCode::RequestInProgress));
        gps.get_satellite_data(None).unwrap();
        callbacks.satellites(sats);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            plugin
                .calls()
                .into_iter()
                .filter(|c| c.starts_with("get_satellite_data"))
                .collect::<Vec<_>>(),
            vec!["get_satellite_data(true)", "get_satellite_data(false)"]
        );
        gps.stop(HandlerType::Gps).unwrap();
    }

    #[test]
    fn test_nmea_stream() {
        let (gps, plugin) = gps();
        gps.start(HandlerType::Gps).unwrap();
        let (sink, mut rx) = tokio::sync::mpsc::unbounded_channel();
        gps.get_nmea_data(Some(sink)).unwrap();

        plugin.handle().unwrap().nmea(NmeaSentence {
            timestamp: 1,
            sentence: "$GPGGA,,,,,,0,,,,,,,,*66".to_string(),
        });
        assert!(rx.try_recv().unwrap().sentence.starts_with("$GPGGA"));
        gps.get_nmea_data(None).unwrap();
        assert_eq!(plugin.count("get_nmea_data(false)"), 1);
    }

    #[test]
    fn test_stream_disable_failure_still_releases() {
        let (gps, plugin) = gps();
        *plugin.fail_disable.lock() = Some(ErrorCode::Timeout);
        gps.start(HandlerType::Gps).unwrap();

        let (sat_sink, _sat_rx) = tokio::sync::mpsc::unbounded_channel();
        let (nmea_sink, _nmea_rx) = tokio::sync::mpsc::unbounded_channel();
        gps.get_satellite_data(Some(sat_sink)).unwrap();
        gps.get_nmea_data(Some(nmea_sink)).unwrap();

        assert_eq!(gps.get_satellite_data(None), Ok(()));
        assert_eq!(gps.get_nmea_data(None), Ok(()));
        assert_eq!(plugin.count("get_satellite_data(false)"), 1);
        assert_eq!(plugin.count("get_nmea_data(false)"), 1);

        // Nothing is left in flight, so the handler can stop.
        assert_eq!(gps.stop(HandlerType::Gps), Ok(()));
    }

    #[test]
    fn test_position_and_geocode_rules() {
        let (gps, plugin) = gps();
        gps.start(HandlerType::Gps).unwrap();
        let (sink, mut rx) = fix_channel();
        gps.get_position(Some(sink.clone()), HandlerType::Gps).unwrap();
        assert_eq!(
            gps.get_position(Some(sink), HandlerType::Gps),
            Err(ErrorCode::DuplicateRequest)
        );
        plugin.emit_at(37.1, -122.1);
        assert_eq!(rx.try_recv().unwrap().source, HandlerType::Gps);

        let (tx, _rx) = geocode_channel();
        assert_eq!(
            gps.get_geocode(GeocodeQuery::new("x"), Some(tx)),
            Err(ErrorCode::NotApplicableToThisHandler)
        );
    }

    #[test]
    fn test_missing_plugin() {
        let gps = GpsHandler::new(None, GpsHandlerConfig::default());
        assert!(!gps.is_available(HandlerType::Gps));
        assert_eq!(gps.start(HandlerType::Gps), Err(ErrorCode::NotAvailable));
        assert_eq!(gps.send_extra_command("x"), Err(ErrorCode::NotAvailable));
        assert!(!gps.handle_command(1, &Value::Null));
    }

    #[test]
    fn test_time_request_injects_ntp_time() {
        let server = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 48];
            let (_, peer) = server.recv_from(&mut buf).unwrap();
            let mut reply = [0u8; 48];
            reply[0] = 0x24;
            reply[1] = 2;
            let secs = (1_700_000_000u64 + 2_208_988_800) as u32;
            reply[40..44].copy_from_slice(&secs.to_be_bytes());
            server.send_to(&reply, peer).unwrap();
        });

        let mut config = GpsHandlerConfig::default();
        config.parameters.ntp_server = Some(addr.to_string());
        let (gps, plugin) = gps_with(config);
        gps.start(HandlerType::Gps).unwrap();

        plugin.handle().unwrap().request_time();
        responder.join().unwrap();

        for _ in 0..200 {
            if !plugin.injected_time.lock().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(plugin.injected_time.lock()[0].unix_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_time_request_timeout_injects_nothing() {
        // Bound but silent, so the exchange times out.
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();

        let mut config = GpsHandlerConfig::default();
        config.parameters.ntp_server = Some(silent.local_addr().unwrap().to_string());
        config.ntp = NtpClient::new(Duration::from_millis(50));
        let (gps, plugin) = gps_with(config);
        gps.start(HandlerType::Gps).unwrap();

        plugin.handle().unwrap().request_time();
        std::thread::sleep(Duration::from_millis(300));

        assert!(plugin.injected_time.lock().is_empty());
        assert_eq!(gps.start(HandlerType::Gps), Ok(()));
    }

    #[tokio::test]
    async fn test_xtra_request_downloads_and_injects() {
        let client = MockAsyncHttpClient::ok(b"xtra-blob".to_vec());
        let mut config = GpsHandlerConfig::default();
        config.parameters.xtra_servers = vec!["https://xtra1.example.com/xtra.bin".to_string()];
        config.transport = Some(Arc::new(HttpTransactionManager::new(client.clone())));
        let (gps, plugin) = gps_with(config);
        gps.start(HandlerType::Gps).unwrap();

        plugin.handle().unwrap().request_xtra();
        for _ in 0..100 {
            if !plugin.injected_xtra.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(plugin.injected_xtra.lock()[0], b"xtra-blob".to_vec());
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_xtra_tries_every_server() {
        let client = MockAsyncHttpClient::err(HttpError::Request("refused".into()));
        let mut config = GpsHandlerConfig::default();
        config.parameters.xtra_servers = vec![
            "https://xtra1.example.com/xtra.bin".to_string(),
            "https://xtra2.example.com/xtra.bin".to_string(),
            "https://xtra3.example.com/xtra.bin".to_string(),
        ];
        config.transport = Some(Arc::new(HttpTransactionManager::new(client.clone())));
        let (gps, plugin) = gps_with(config);
        gps.start(HandlerType::Gps).unwrap();

        plugin.handle().unwrap().request_xtra();
        for _ in 0..100 {
            if client.request_count() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            client.requests.lock().clone(),
            vec![
                "https://xtra1.example.com/xtra.bin",
                "https://xtra2.example.com/xtra.bin",
                "https://xtra3.example.com/xtra.bin"
            ]
        );
        assert!(plugin.injected_xtra.lock().is_empty());
    }
}
