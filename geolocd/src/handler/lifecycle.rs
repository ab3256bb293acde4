//! State machine shared by the plugin-backed handlers.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Fix, FixSink, HandlerState, HandlerType, InFlight, Operation};
use crate::error::ErrorCode;
use crate::plugin::{PluginCallbacks, PluginListener, PositionPlugin};
use crate::position::{Accuracy, FixResult, Position};
use crate::store::{PositionStore, StoredFix};

#[derive(Default)]
struct CoreState {
    started: bool,
    /// A caller is inside `plugin.start`.
    starting: bool,
    in_flight: InFlight,
    position_sink: Option<FixSink>,
    tracking_sink: Option<FixSink>,
    last_fix: Option<(Position, Accuracy)>,
}

/// Lifecycle, in-flight bookkeeping and fix routing for one source.
///
/// Plugin calls are always made without the state lock held, since plugins
/// may call back synchronously.
pub(super) struct HandlerCore {
    kind: HandlerType,
    state: Mutex<CoreState>,
    store: Option<Arc<dyn PositionStore>>,
}

impl HandlerCore {
    pub fn new(kind: HandlerType, store: Option<Arc<dyn PositionStore>>) -> Self {
        Self {
            kind,
            state: Mutex::new(CoreState::default()),
            store,
        }
    }

    pub fn kind(&self) -> HandlerType {
        self.kind
    }

    pub fn state(&self) -> HandlerState {
        let state = self.state.lock();
        match (state.started, state.in_flight.is_empty()) {
            (false, _) => HandlerState::Idle,
            (true, true) => HandlerState::Started,
            (true, false) => HandlerState::Busy(state.in_flight),
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Start the plugin. Returns `Ok(true)` if this call started it and
    /// `Ok(false)` if it was already running. A concurrent caller that finds
    /// the plugin still starting gets `RequestInProgress`.
    pub fn start<P: PositionPlugin + ?Sized>(
        &self,
        plugin: Option<&P>,
        listener: &Arc<dyn PluginListener>,
    ) -> Result<bool, ErrorCode> {
        let plugin = {
            let mut state = self.state.lock();
            if state.started {
                return Ok(false);
            }
            if state.starting {
                return Err(ErrorCode::RequestInProgress);
            }
            let plugin = plugin.ok_or(ErrorCode::NotAvailable)?;
            state.starting = true;
            plugin
        };

        let result = plugin.start(PluginCallbacks::new(listener));
        {
            let mut state = self.state.lock();
            state.starting = false;
            state.started = result.is_ok();
        }

        if let Err(e) = result {
            tracing::warn!(handler = %self.kind, plugin = plugin.name(), error = %e, "Plugin start failed");
            return Err(e);
        }
        tracing::info!(handler = %self.kind, plugin = plugin.name(), "Handler started");
        Ok(true)
    }

    /// Stop the plugin. Returns `Ok(false)` if it was not running.
    pub fn stop<P: PositionPlugin + ?Sized>(&self, plugin: Option<&P>) -> Result<bool, ErrorCode> {
        {
            let mut state = self.state.lock();
            if !state.started {
                return Ok(false);
            }
            if !state.in_flight.is_empty() {
                tracing::debug!(handler = %self.kind, in_flight = ?state.in_flight, "Stop refused");
                return Err(ErrorCode::RequestInProgress);
            }
            state.started = false;
        }

        if let Some(plugin) = plugin {
            if let Err(e) = plugin.stop() {
                tracing::warn!(handler = %self.kind, error = %e, "Plugin stop failed");
            }
        }
        tracing::info!(handler = %self.kind, "Handler stopped");
        Ok(true)
    }

    /// Mark `op` in flight.
    pub fn begin(&self, op: Operation) -> Result<(), ErrorCode> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(ErrorCode::NotStarted);
        }
        if !state.in_flight.insert(op) {
            return Err(ErrorCode::DuplicateRequest);
        }
        Ok(())
    }

    /// Clear `op` and its sink. Returns whether it was in flight.
    pub fn release(&self, op: Operation) -> bool {
        let mut state = self.state.lock();
        match op {
            Operation::GetPosition => state.position_sink = None,
            Operation::StartTracking => state.tracking_sink = None,
            Operation::SatelliteData | Operation::NmeaData => {}
        }
        state.in_flight.remove(op)
    }

    pub fn is_in_flight(&self, op: Operation) -> bool {
        self.state.lock().in_flight.contains(op)
    }

    fn begin_with_sink(&self, op: Operation, sink: FixSink) -> Result<(), ErrorCode> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(ErrorCode::NotStarted);
        }
        if !state.in_flight.insert(op) {
            return Err(ErrorCode::DuplicateRequest);
        }
        match op {
            Operation::GetPosition => state.position_sink = Some(sink),
            _ => state.tracking_sink = Some(sink),
        }
        Ok(())
    }

    pub fn get_position<P: PositionPlugin + ?Sized>(
        &self,
        plugin: Option<&P>,
        sink: Option<FixSink>,
    ) -> Result<(), ErrorCode> {
        let Some(sink) = sink else {
            if self.release(Operation::GetPosition) {
                tracing::debug!(handler = %self.kind, "Position request disabled");
            }
            return Ok(());
        };
        let plugin = plugin.ok_or(ErrorCode::NotAvailable)?;

        self.begin_with_sink(Operation::GetPosition, sink)?;
        if let Err(e) = plugin.get_position() {
            self.release(Operation::GetPosition);
            tracing::warn!(handler = %self.kind, error = %e, "Position request failed");
            return Err(e);
        }
        tracing::debug!(handler = %self.kind, "Position requested");
        Ok(())
    }

    pub fn start_tracking<P: PositionPlugin + ?Sized>(
        &self,
        plugin: Option<&P>,
        sink: Option<FixSink>,
    ) -> Result<(), ErrorCode> {
        let Some(sink) = sink else {
            if self.release(Operation::StartTracking) {
                if let Some(plugin) = plugin {
                    if let Err(e) = plugin.start_tracking(false) {
                        tracing::warn!(handler = %self.kind, error = %e, "Failed to disable tracking");
                    }
                }
                tracing::debug!(handler = %self.kind, "Tracking disabled");
            }
            return Ok(());
        };
        let plugin = plugin.ok_or(ErrorCode::NotAvailable)?;

        self.begin_with_sink(Operation::StartTracking, sink)?;
        if let Err(e) = plugin.start_tracking(true) {
            self.release(Operation::StartTracking);
            tracing::warn!(handler = %self.kind, error = %e, "Tracking request failed");
            return Err(e);
        }
        tracing::debug!(handler = %self.kind, "Tracking enabled");
        Ok(())
    }

    /// Route a plugin fix to the pending request and the tracking sink.
    ///
    /// Fixes that arrive when neither is in flight are dropped.
    pub fn deliver(&self, result: FixResult) {
        let (once, tracking) = {
            let mut state = self.state.lock();
            let once = if state.in_flight.remove(Operation::GetPosition) {
                state.position_sink.take()
            } else {
                None
            };
            let tracking = if state.in_flight.contains(Operation::StartTracking) {
                state.tracking_sink.clone()
            } else {
                None
            };
            if once.is_none() && tracking.is_none() {
                tracing::trace!(handler = %self.kind, "Dropping fix with no request in flight");
                return;
            }
            if let Ok(fix) = &result {
                state.last_fix = Some(*fix);
            }
            (once, tracking)
        };

        if let Ok((position, accuracy)) = &result {
            self.persist(position, accuracy);
        }

        let fix = Fix {
            source: self.kind,
            result,
        };
        if let Some(sink) = once {
            sink.on_fix(fix.clone());
        }
        if let Some(sink) = tracking {
            sink.on_fix(fix);
        }
    }

    /// Most recent fix, falling back to the store after a restart.
    pub fn last_position(&self) -> FixResult {
        if let Some(fix) = self.state.lock().last_fix {
            return Ok(fix);
        }

        let store = self.store.as_ref().ok_or(ErrorCode::NotAvailable)?;
        match store.get(self.kind.key()) {
            Ok(Some(stored)) => stored.to_fix().ok_or(ErrorCode::NotAvailable),
            Ok(None) => Err(ErrorCode::NotAvailable),
            Err(e) => {
                tracing::warn!(handler = %self.kind, error = %e, "Failed to read last position");
                Err(ErrorCode::NotAvailable)
            }
        }
    }

    fn persist(&self, position: &Position, accuracy: &Accuracy) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put(self.kind.key(), &StoredFix::new(position, accuracy)) {
                tracing::warn!(handler = %self.kind, error = %e, "Failed to store last position");
            }
        }
    }
}
