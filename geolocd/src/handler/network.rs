//! Network positioning composite.
//!
//! Owns up to three radio sub-handlers and republishes each sub-handler's
//! fixes to the sink registered for that sub-handler type. Requests for
//! `HandlerType::Network` are served by the Hybrid sub-handler.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::radio::RadioHandler;
use super::{Fix, FixListener, FixSink, HandlerState, HandlerType, Operation, PositionHandler};
use crate::error::ErrorCode;
use crate::plugin::PositionPlugin;
use crate::position::FixResult;

type RouteTable = Mutex<HashMap<(HandlerType, Operation), FixSink>>;

/// Forwards one sub-handler's fixes to the caller's sink.
struct Relay {
    routes: Weak<RouteTable>,
    kind: HandlerType,
    op: Operation,
}

impl FixListener for Relay {
    fn on_fix(&self, fix: Fix) {
        let Some(routes) = self.routes.upgrade() else {
            return;
        };
        let sink = {
            let mut routes = routes.lock();
            match self.op {
                Operation::GetPosition => routes.remove(&(self.kind, self.op)),
                _ => routes.get(&(self.kind, self.op)).cloned(),
            }
        };
        match sink {
            Some(sink) => sink.on_fix(fix),
            None => tracing::trace!(handler = %self.kind, "No route for network fix"),
        }
    }
}

pub struct NetworkHandler {
    wifi: Option<RadioHandler>,
    cell: Option<RadioHandler>,
    hybrid: Option<RadioHandler>,
    routes: Arc<RouteTable>,
}

impl NetworkHandler {
    /// Build sub-handlers for the given plugins, without persistence.
    pub fn new(
        wifi: Option<Arc<dyn PositionPlugin>>,
        cell: Option<Arc<dyn PositionPlugin>>,
        hybrid: Option<Arc<dyn PositionPlugin>>,
    ) -> Self {
        let radio = |kind, plugin: Option<Arc<dyn PositionPlugin>>| {
            plugin.map(|p| RadioHandler::new(kind, Some(p), None))
        };
        Self::from_handlers(
            radio(HandlerType::Wifi, wifi),
            radio(HandlerType::Cell, cell),
            radio(HandlerType::Hybrid, hybrid),
        )
    }

    pub fn from_handlers(
        wifi: Option<RadioHandler>,
        cell: Option<RadioHandler>,
        hybrid: Option<RadioHandler>,
    ) -> Self {
        Self {
            wifi,
            cell,
            hybrid,
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn resolve(handler: HandlerType) -> Result<HandlerType, ErrorCode> {
        match handler {
            HandlerType::Network => Ok(HandlerType::Hybrid),
            HandlerType::Wifi | HandlerType::Cell | HandlerType::Hybrid => Ok(handler),
            HandlerType::Gps | HandlerType::Lbs => Err(ErrorCode::WrongParameter),
        }
    }

    fn sub(&self, handler: HandlerType) -> Result<(HandlerType, &RadioHandler), ErrorCode> {
        let kind = Self::resolve(handler)?;
        let sub = match kind {
            HandlerType::Wifi => self.wifi.as_ref(),
            HandlerType::Cell => self.cell.as_ref(),
            _ => self.hybrid.as_ref(),
        };
        sub.map(|s| (kind, s)).ok_or(ErrorCode::NotAvailable)
    }

    fn request(
        &self,
        op: Operation,
        sink: Option<FixSink>,
        handler: HandlerType,
        call: fn(&RadioHandler, Option<FixSink>, HandlerType) -> Result<(), ErrorCode>,
    ) -> Result<(), ErrorCode> {
        let (kind, sub) = self.sub(handler)?;

        let Some(sink) = sink else {
            self.routes.lock().remove(&(kind, op));
            return call(sub, None, kind);
        };

        {
            let mut routes = self.routes.lock();
            if routes.contains_key(&(kind, op)) {
                return Err(ErrorCode::DuplicateRequest);
            }
            routes.insert((kind, op), sink);
        }

        let relay: FixSink = Arc::new(Relay {
            routes: Arc::downgrade(&self.routes),
            kind,
            op,
        });
        call(sub, Some(relay), kind).inspect_err(|_| {
            self.routes.lock().remove(&(kind, op));
        })
    }
}

impl PositionHandler for NetworkHandler {
    fn kind(&self) -> HandlerType {
        HandlerType::Network
    }

    fn is_available(&self, handler: HandlerType) -> bool {
        self.sub(handler)
            .map(|(kind, sub)| sub.is_available(kind))
            .unwrap_or(false)
    }

    fn state(&self, handler: HandlerType) -> HandlerState {
        self.sub(handler)
            .map(|(kind, sub)| sub.state(kind))
            .unwrap_or(HandlerState::Idle)
    }

    fn start(&self, handler: HandlerType) -> Result<(), ErrorCode> {
        let (kind, sub) = self.sub(handler)?;
        sub.start(kind)
    }

    fn stop(&self, handler: HandlerType) -> Result<(), ErrorCode> {
        let (kind, sub) = self.sub(handler)?;
        sub.stop(kind)
    }

    fn get_position(&self, sink: Option<FixSink>, handler: HandlerType) -> Result<(), ErrorCode> {
        self.request(Operation::GetPosition, sink, handler, |sub, sink, kind| {
            sub.get_position(sink, kind)
        })
    }

    fn start_tracking(
        &self,
        sink: Option<FixSink>,
        handler: HandlerType,
    ) -> Result<(), ErrorCode> {
        self.request(Operation::StartTracking, sink, handler, |sub, sink, kind| {
            sub.start_tracking(sink, kind)
        })
    }

    fn get_last_position(&self, handler: HandlerType) -> FixResult {
        let (kind, sub) = self.sub(handler)?;
        sub.get_last_position(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::fix_channel;
    use crate::handler::tests::ScriptedPlugin;

    fn network() -> (NetworkHandler, Arc<ScriptedPlugin>, Arc<ScriptedPlugin>) {
        let wifi = ScriptedPlugin::new();
        let hybrid = ScriptedPlugin::new();
        let handler = NetworkHandler::new(Some(wifi.clone()), None, Some(hybrid.clone()));
        (handler, wifi, hybrid)
    }

    #[test]
    fn test_network_routes_to_hybrid() {
        let (network, wifi, hybrid) = network();
        network.start(HandlerType::Network).unwrap();
        assert_eq!(hybrid.count("start"), 1);
        assert_eq!(wifi.count("start"), 0);
        assert_eq!(network.state(HandlerType::Hybrid), HandlerState::Started);
    }

    #[test]
    fn test_absent_and_foreign_sub_handlers() {
        let (network, _wifi, _hybrid) = network();
        assert_eq!(network.start(HandlerType::Cell), Err(ErrorCode::NotAvailable));
        assert_eq!(network.start(HandlerType::Gps), Err(ErrorCode::WrongParameter));
        assert!(!network.is_available(HandlerType::Cell));
        assert!(network.is_available(HandlerType::Wifi));
        assert_eq!(network.state(HandlerType::Cell), HandlerState::Idle);
    }

    #[test]
    fn test_fixes_republished_per_sub_handler() {
        let (network, wifi, hybrid) = network();
        network.start(HandlerType::Wifi).unwrap();
        network.start(HandlerType::Hybrid).unwrap();

        let (wifi_sink, mut wifi_rx) = fix_channel();
        let (hybrid_sink, mut hybrid_rx) = fix_channel();
        network
            .start_tracking(Some(wifi_sink), HandlerType::Wifi)
            .unwrap();
        network
            .start_tracking(Some(hybrid_sink), HandlerType::Network)
            .unwrap();

        wifi.emit_at(1.0, 1.0);
        wifi.emit_at(2.0, 2.0);
        hybrid.emit_at(3.0, 3.0);

        assert_eq!(wifi_rx.try_recv().unwrap().source, HandlerType::Wifi);
        assert_eq!(wifi_rx.try_recv().unwrap().source, HandlerType::Wifi);
        assert!(wifi_rx.try_recv().is_err());
        assert_eq!(hybrid_rx.try_recv().unwrap().source, HandlerType::Hybrid);
        assert!(hybrid_rx.try_recv().is_err());
    }

    #[test]
    fn test_single_request_route_is_consumed() {
        let (network, wifi, _hybrid) = network();
        network.start(HandlerType::Wifi).unwrap();

        let (sink, mut rx) = fix_channel();
        network.get_position(Some(sink.clone()), HandlerType::Wifi).unwrap();
        assert_eq!(
            network.get_position(Some(sink.clone()), HandlerType::Wifi),
            Err(ErrorCode::DuplicateRequest)
        );

        wifi.emit_at(1.0, 1.0);
        assert!(rx.try_recv().is_ok());

        network.get_position(Some(sink), HandlerType::Wifi).unwrap();
        assert_eq!(wifi.count("get_position"), 2);
    }

    #[test]
    fn test_failed_request_leaves_no_route() {
        let (network, _wifi, _hybrid) = network();
        let (sink, _rx) = fix_channel();
        assert_eq!(
            network.get_position(Some(sink.clone()), HandlerType::Wifi),
            Err(ErrorCode::NotStarted)
        );

        network.start(HandlerType::Wifi).unwrap();
        network.get_position(Some(sink), HandlerType::Wifi).unwrap();
    }

    #[test]
    fn test_stop_guard_through_composite() {
        let (network, _wifi, _hybrid) = network();
        network.start(HandlerType::Wifi).unwrap();
        let (sink, _rx) = fix_channel();
        network.start_tracking(Some(sink), HandlerType::Wifi).unwrap();

        assert_eq!(network.stop(HandlerType::Wifi), Err(ErrorCode::RequestInProgress));
        network.start_tracking(None, HandlerType::Wifi).unwrap();
        assert_eq!(network.stop(HandlerType::Wifi), Ok(()));
    }
}
