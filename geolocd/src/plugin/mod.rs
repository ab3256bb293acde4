//! Position-source plugin interface.
//!
//! A plugin wraps one platform positioning source (GNSS chipset, Wi-Fi
//! scanner, cell modem, hybrid network backend). Constructing a plugin
//! initializes it and dropping it shuts it down; the handler that owns it
//! only ever talks to it through the traits in this module.
//!
//! Plugins report asynchronous results through a [`PluginCallbacks`] handle
//! handed to them on [`PositionPlugin::start`]. Callbacks may be invoked from
//! any thread, including from inside the plugin call that triggered them.

mod gnss;
mod replay;

use std::sync::{Arc, Weak};

pub use gnss::{
    GeofenceArea, GeofenceEvent, GeofenceTransition, GnssPlugin, NmeaSentence, PositionMode,
};
pub use replay::{ReplayError, ReplayFix, ReplayPlugin};

use crate::error::ErrorCode;
use crate::position::{FixResult, SatelliteData};

/// Receiver side of plugin callbacks, implemented by handlers.
pub trait PluginListener: Send + Sync {
    /// A fix (or a fix-time error) is available.
    fn on_position(&self, result: FixResult);

    /// A new satellite snapshot is available.
    fn on_satellites(&self, _data: SatelliteData) {}

    /// A raw NMEA sentence was produced.
    fn on_nmea(&self, _sentence: NmeaSentence) {}

    /// The engine asks for network time to be injected.
    fn on_time_request(&self) {}

    /// The engine asks for XTRA assistance data to be injected.
    fn on_xtra_request(&self) {}

    /// A geofence transition was detected.
    fn on_geofence(&self, _event: GeofenceEvent) {}
}

/// Typed callback handle given to a plugin.
///
/// Holds a weak reference to its handler so a plugin that outlives its
/// handler (or keeps firing after `stop`) cannot keep it alive; calls made
/// after the handler is gone are silently dropped.
#[derive(Clone)]
pub struct PluginCallbacks {
    listener: Weak<dyn PluginListener>,
}

impl PluginCallbacks {
    pub fn new(listener: &Arc<dyn PluginListener>) -> Self {
        Self {
            listener: Arc::downgrade(listener),
        }
    }

    pub fn position(&self, result: FixResult) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_position(result);
        }
    }

    pub fn satellites(&self, data: SatelliteData) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_satellites(data);
        }
    }

    pub fn nmea(&self, sentence: NmeaSentence) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_nmea(sentence);
        }
    }

    pub fn request_time(&self) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_time_request();
        }
    }

    pub fn request_xtra(&self) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_xtra_request();
        }
    }

    pub fn geofence(&self, event: GeofenceEvent) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_geofence(event);
        }
    }

    /// True while the owning handler is alive.
    pub fn is_attached(&self) -> bool {
        self.listener.strong_count() > 0
    }
}

impl std::fmt::Debug for PluginCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCallbacks")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Operations every position plugin supports.
pub trait PositionPlugin: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Power up the source and remember where to report results.
    fn start(&self, callbacks: PluginCallbacks) -> Result<(), ErrorCode>;

    /// Power down the source.
    fn stop(&self) -> Result<(), ErrorCode>;

    /// Request a single fix, reported through [`PluginCallbacks::position`].
    fn get_position(&self) -> Result<(), ErrorCode>;

    /// Enable or disable periodic fixes.
    fn start_tracking(&self, enable: bool) -> Result<(), ErrorCode>;
}

/// The plugins available to this process, one slot per source category.
#[derive(Clone, Default)]
pub struct PluginSet {
    pub gps: Option<Arc<dyn GnssPlugin>>,
    pub wifi: Option<Arc<dyn PositionPlugin>>,
    pub cell: Option<Arc<dyn PositionPlugin>>,
    pub hybrid: Option<Arc<dyn PositionPlugin>>,
}

impl PluginSet {
    /// Names of the loaded plugins, for startup logging.
    pub fn loaded(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(p) = &self.gps {
            names.push(p.name());
        }
        for p in [&self.wifi, &self.cell, &self.hybrid].into_iter().flatten() {
            names.push(p.name());
        }
        names
    }
}
