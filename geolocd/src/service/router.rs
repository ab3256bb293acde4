//! Request router shared by every client connection.
//!
//! Requests for the same handler and operation share one handler request,
//! and replies fan out to every client waiting on it. Cancelling a client
//! drops its waits and releases handlers nobody else uses.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::reply::Reply;
use super::request::Request;
use crate::context::AppContext;
use crate::criteria::{Criteria, SubscriberId};
use crate::error::ErrorCode;
use crate::handler::{Fix, FixListener, FixSink, Handler, HandlerType, Operation, PositionHandler};
use crate::position::Position;
use crate::wsp::{geocode_channel, GeocodeQuery, GeocodeReceiver};

/// Identity of one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

type ReplySender = mpsc::UnboundedSender<Reply>;
type Waiters = HashMap<(HandlerType, Operation), Vec<(ClientId, ReplySender)>>;

/// Shares one handler request among every client waiting on it.
struct Fanout {
    waiters: Weak<Mutex<Waiters>>,
    key: (HandlerType, Operation),
}

impl FixListener for Fanout {
    fn on_fix(&self, fix: Fix) {
        let Some(waiters) = self.waiters.upgrade() else {
            return;
        };
        let targets = {
            let mut waiters = waiters.lock();
            match self.key.1 {
                Operation::GetPosition => waiters.remove(&self.key).unwrap_or_default(),
                _ => waiters.get(&self.key).cloned().unwrap_or_default(),
            }
        };

        let reply = Reply::from_fix(&fix);
        for (_, tx) in targets {
            let _ = tx.send(reply.clone());
        }
    }
}

/// Converts fixes for a single subscriber.
struct ReplyRelay(ReplySender);

impl FixListener for ReplyRelay {
    fn on_fix(&self, fix: Fix) {
        if self.0.send(Reply::from_fix(&fix)).is_err() {
            tracing::trace!("Criteria reply stream closed");
        }
    }
}

fn send(tx: &ReplySender, reply: Reply) {
    let _ = tx.send(reply);
}

/// `Network` and `Hybrid` share one source.
fn canonical(kind: HandlerType) -> HandlerType {
    match kind {
        HandlerType::Network => HandlerType::Hybrid,
        other => other,
    }
}

/// Turns decoded requests into handler and engine calls.
///
/// Several clients asking the same handler for a fix or for tracking share
/// one handler request; the handler is enabled for the first and released
/// after the last. Criteria subscriptions are keyed by client, so each
/// client holds at most one.
pub struct LocationService {
    context: Arc<AppContext>,
    waiters: Arc<Mutex<Waiters>>,
    satellite_owner: Mutex<Option<ClientId>>,
    // Serializes enabling and releasing handlers. Never held while replying.
    lifecycle: Mutex<()>,
}

impl LocationService {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self {
            context,
            waiters: Arc::new(Mutex::new(HashMap::new())),
            satellite_owner: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Handle one request. The returned stream ends after the last reply:
    /// immediately for one-shot methods, on stop or cancel for subscriptions.
    pub fn handle(&self, client: ClientId, request: Request) -> mpsc::UnboundedReceiver<Reply> {
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(client = %client, method = request.method(), "Request received");

        let criteria = request.criteria();
        match request {
            Request::GetCurrentPosition { handler } => {
                self.share(client, canonical(handler), Operation::GetPosition, tx)
            }
            Request::StartTracking { handler } => {
                self.share(client, canonical(handler), Operation::StartTracking, tx)
            }
            Request::StartTrackingCriteria { .. } => {
                if let Some(criteria) = criteria {
                    self.start_criteria(client, criteria, tx);
                }
            }
            Request::StopTracking { handler } => {
                let result = match handler {
                    Some(kind) => self.stop_tracking(client, canonical(kind)),
                    None => self.stop_criteria(client),
                };
                send(&tx, Reply::from_result(result));
            }
            Request::GetLastPosition { handler } => {
                let reply = match self
                    .route(handler)
                    .and_then(|h| h.get_last_position(handler))
                {
                    Ok((position, accuracy)) => Reply::position(handler, &position, &accuracy),
                    Err(e) => Reply::error(e),
                };
                send(&tx, reply);
            }
            Request::GetGpsSatelliteData => self.satellite_data(client, tx),
            Request::SendExtraCommand { command } => {
                let result = self
                    .route(HandlerType::Gps)
                    .and_then(|h| h.send_extra_command(&command));
                send(&tx, Reply::from_result(result));
            }
            Request::GetGeoCodeLocation { address } => {
                let (sink, rx) = geocode_channel();
                let result = self
                    .route(HandlerType::Lbs)
                    .and_then(|h| h.get_geocode(GeocodeQuery::new(address), Some(sink)));
                self.await_geocode(result, rx, tx);
            }
            Request::GetReverseLocation {
                latitude,
                longitude,
            } => {
                let (sink, rx) = geocode_channel();
                let result = Position::now(latitude, longitude)
                    .ok_or(ErrorCode::WrongParameter)
                    .and_then(|position| {
                        self.route(HandlerType::Lbs)
                            .and_then(|h| h.get_reverse_geocode(position, Some(sink)))
                    });
                self.await_geocode(result, rx, tx);
            }
            Request::GetState { handler } => {
                let reply = match self.route(handler) {
                    Ok(h) => Reply::state(handler, h.is_available(handler), h.state(handler)),
                    Err(e) => Reply::error(e),
                };
                send(&tx, reply);
            }
            Request::SetGpsParameters { opcode, data } => {
                send(&tx, self.gps_command(opcode, &data));
            }
        }
        rx
    }

    /// Drop everything `client` holds. Called when its connection closes.
    pub fn cancel_client(&self, client: ClientId) {
        let _guard = self.lifecycle.lock();

        let released: Vec<HandlerType> = {
            let mut waiters = self.waiters.lock();
            let mut released = Vec::new();
            for ((kind, op), list) in waiters.iter_mut() {
                let before = list.len();
                list.retain(|(c, _)| *c != client);
                if *op == Operation::StartTracking && before > 0 && list.is_empty() {
                    released.push(*kind);
                }
            }
            for kind in &released {
                waiters.remove(&(*kind, Operation::StartTracking));
            }
            released
        };
        for kind in released {
            self.release_tracking(kind);
        }

        self.context
            .criteria()
            .remove_message_from_criteria_req_list(SubscriberId(client.0));

        let mut owner = self.satellite_owner.lock();
        if *owner == Some(client) {
            *owner = None;
            if let Ok(gps) = self.route(HandlerType::Gps) {
                if let Err(e) = gps.get_satellite_data(None) {
                    tracing::debug!(error = %e, "Satellite stream not released");
                }
            }
        }
        tracing::debug!(client = %client, "Client cancelled");
    }

    fn route(&self, kind: HandlerType) -> Result<&Arc<Handler>, ErrorCode> {
        self.context.handlers().route(kind)
    }

    /// Join or open the shared `op` request on `kind`.
    fn share(&self, client: ClientId, kind: HandlerType, op: Operation, tx: ReplySender) {
        let handler = match self.route(kind) {
            Ok(h) => Arc::clone(h),
            Err(e) => return send(&tx, Reply::error(e)),
        };

        let _guard = self.lifecycle.lock();
        let key = (kind, op);
        {
            let mut waiters = self.waiters.lock();
            if let Some(list) = waiters.get_mut(&key) {
                if op == Operation::StartTracking && list.iter().any(|(c, _)| *c == client) {
                    return send(&tx, Reply::error(ErrorCode::DuplicateRequest));
                }
                list.push((client, tx));
                return;
            }
        }

        let sink: FixSink = Arc::new(Fanout {
            waiters: Arc::downgrade(&self.waiters),
            key,
        });
        // Registered before the call so a fix delivered during it is not lost.
        self.waiters.lock().insert(key, vec![(client, tx)]);

        let result = handler.start(kind).and_then(|_| match op {
            Operation::GetPosition => handler.get_position(Some(sink), kind),
            _ => handler.start_tracking(Some(sink), kind),
        });

        if let Err(e) = result {
            tracing::debug!(handler = %kind, error = %e, "Shared request failed");
            let failed = self.waiters.lock().remove(&key).unwrap_or_default();
            for (_, tx) in failed {
                send(&tx, Reply::error(e));
            }
        }
    }

    fn stop_tracking(&self, client: ClientId, kind: HandlerType) -> Result<(), ErrorCode> {
        let _guard = self.lifecycle.lock();
        let key = (kind, Operation::StartTracking);

        let last = {
            let mut waiters = self.waiters.lock();
            let list = waiters.get_mut(&key).ok_or(ErrorCode::NotStarted)?;
            let before = list.len();
            list.retain(|(c, _)| *c != client);
            if list.len() == before {
                return Err(ErrorCode::NotStarted);
            }
            let last = list.is_empty();
            if last {
                waiters.remove(&key);
            }
            last
        };

        if last {
            self.release_tracking(kind);
        }
        Ok(())
    }

    fn release_tracking(&self, kind: HandlerType) {
        let Ok(handler) = self.route(kind) else {
            return;
        };
        if let Err(e) = handler.start_tracking(None, kind) {
            tracing::warn!(handler = %kind, error = %e, "Failed to disable tracking");
        }
        if let Err(e) = handler.stop(kind) {
            tracing::debug!(handler = %kind, error = %e, "Handler left running");
        }
        tracing::info!(handler = %kind, "Tracking released");
    }

    fn start_criteria(&self, client: ClientId, criteria: Criteria, tx: ReplySender) {
        let sink: FixSink = Arc::new(ReplyRelay(tx.clone()));
        match self
            .context
            .criteria()
            .start_criteria_tracking(SubscriberId(client.0), sink, criteria)
        {
            Ok(handlers) => {
                tracing::info!(client = %client, handlers = ?handlers, "Criteria tracking started");
            }
            Err(e) => send(&tx, Reply::error(e)),
        }
    }

    fn stop_criteria(&self, client: ClientId) -> Result<(), ErrorCode> {
        if self
            .context
            .criteria()
            .remove_message_from_criteria_req_list(SubscriberId(client.0))
        {
            Ok(())
        } else {
            Err(ErrorCode::NotStarted)
        }
    }

    fn satellite_data(&self, client: ClientId, tx: ReplySender) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => return send(&tx, Reply::error(ErrorCode::Multithread)),
        };
        let gps = match self.route(HandlerType::Gps) {
            Ok(h) => Arc::clone(h),
            Err(e) => return send(&tx, Reply::error(e)),
        };

        let mut owner = self.satellite_owner.lock();
        if owner.is_some() {
            return send(&tx, Reply::error(ErrorCode::DuplicateRequest));
        }

        let (sat_tx, mut sat_rx) = mpsc::unbounded_channel();
        if let Err(e) = gps
            .start(HandlerType::Gps)
            .and_then(|_| gps.get_satellite_data(Some(sat_tx)))
        {
            return send(&tx, Reply::error(e));
        }
        *owner = Some(client);

        runtime.spawn(async move {
            while let Some(data) = sat_rx.recv().await {
                if tx.send(Reply::satellites(&data)).is_err() {
                    break;
                }
            }
        });
    }

    fn await_geocode(
        &self,
        result: Result<(), ErrorCode>,
        rx: GeocodeReceiver,
        tx: ReplySender,
    ) {
        if let Err(e) = result {
            return send(&tx, Reply::error(e));
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => return send(&tx, Reply::error(ErrorCode::Multithread)),
        };
        runtime.spawn(async move {
            let reply = match rx.await {
                Ok(Ok(result)) => Reply::geocode(&result),
                Ok(Err(e)) => Reply::error(e),
                Err(_) => Reply::error(ErrorCode::NotAvailable),
            };
            send(&tx, reply);
        });
    }

    fn gps_command(&self, opcode: u8, data: &Value) -> Reply {
        match self.context.handlers().gps() {
            Some(gps) if gps.handle_command(opcode, data) => Reply::ok(),
            Some(_) => Reply::error(ErrorCode::WrongParameter),
            None => Reply::error(ErrorCode::NotAvailable),
        }
    }
}
