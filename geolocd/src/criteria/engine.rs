//! Criteria tracking engine.
//!
//! Subscribers ask for fixes by accuracy and power. The engine picks handlers
//! from the selection policy, enables tracking on them, and forwards each fix
//! to the subscribers watching its source once it has moved at least
//! `min_distance_m` (and `min_interval` has passed) since that subscriber's
//! last forwarded fix. A handler is released when its last watcher leaves.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::policy::{AccuracyCriterion, PowerCriterion, SelectionPolicy};
use super::request::{CriteriaRequest, SubscriberId};
use crate::error::ErrorCode;
use crate::handler::{Fix, FixListener, FixSink, HandlerTable, HandlerType, PositionHandler};

/// Default minimum movement between forwarded fixes, meters.
pub const DEFAULT_MIN_DISTANCE_M: f64 = 100.0;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaConfig {
    pub min_distance_m: f64,
    pub min_interval: Duration,
    pub policy: SelectionPolicy,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
            min_interval: Duration::ZERO,
            policy: SelectionPolicy::default(),
        }
    }
}

/// One subscriber's tracking criteria. Unset thresholds fall back to the
/// engine configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criteria {
    pub accuracy: AccuracyCriterion,
    pub power: PowerCriterion,
    pub min_distance_m: Option<f64>,
    pub min_interval: Option<Duration>,
}

impl Criteria {
    pub fn new(accuracy: AccuracyCriterion, power: PowerCriterion) -> Self {
        Self {
            accuracy,
            power,
            min_distance_m: None,
            min_interval: None,
        }
    }
}

/// Result of [`CriteriaEngine::enable_handlers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledHandlers {
    /// Handlers whose fixes the subscriber should receive.
    pub keys: Vec<HandlerType>,
    /// Handlers this call started tracking on.
    pub started: Vec<HandlerType>,
}

#[derive(Default)]
struct EngineState {
    requests: BTreeMap<SubscriberId, CriteriaRequest>,
    /// Subscribers watching each handler the engine tracks on.
    watchers: HashMap<HandlerType, usize>,
}

/// Fans handler fixes out to criteria subscribers.
struct EngineRelay {
    state: Weak<Mutex<EngineState>>,
}

impl FixListener for EngineRelay {
    fn on_fix(&self, fix: Fix) {
        if let Some(state) = self.state.upgrade() {
            route_fix(&state, fix);
        }
    }
}

fn route_fix(state: &Mutex<EngineState>, fix: Fix) {
    let now = Instant::now();
    let deliveries: Vec<(FixSink, SubscriberId)> = {
        let mut state = state.lock();
        state
            .requests
            .values_mut()
            .filter(|req| req.watches(fix.source))
            .filter_map(|req| match &fix.result {
                // Errors reach every watcher and leave the filter state alone.
                Err(_) => Some((Arc::clone(req.sink()), req.subscriber())),
                Ok((position, _)) if req.should_forward(position, now) => {
                    req.record(position, now);
                    Some((Arc::clone(req.sink()), req.subscriber()))
                }
                Ok(_) => None,
            })
            .collect()
    };

    if deliveries.is_empty() {
        tracing::trace!(source = %fix.source, "Fix suppressed for all subscribers");
    }
    for (sink, subscriber) in deliveries {
        tracing::trace!(source = %fix.source, subscriber = %subscriber, "Forwarding fix");
        sink.on_fix(fix.clone());
    }
}

/// Network fixes are reported by the Hybrid sub-handler.
fn canonical(kind: HandlerType) -> HandlerType {
    match kind {
        HandlerType::Network => HandlerType::Hybrid,
        other => other,
    }
}

/// Criteria-based tracking engine.
///
/// Maps an accuracy/power pair to handlers through the [`SelectionPolicy`],
/// enables tracking on them and filters the merged fix stream per
/// subscriber. Handlers are released when their last subscriber leaves.
pub struct CriteriaEngine {
    handlers: Arc<HandlerTable>,
    config: CriteriaConfig,
    state: Arc<Mutex<EngineState>>,
    // Serializes subscribe/unsubscribe. Never held while delivering fixes.
    lifecycle: Mutex<()>,
}

impl CriteriaEngine {
    pub fn new(handlers: Arc<HandlerTable>, config: CriteriaConfig) -> Self {
        Self {
            handlers,
            config,
            state: Arc::new(Mutex::new(EngineState::default())),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CriteriaConfig {
        &self.config
    }

    /// Available handlers for the criteria pair, in priority order.
    pub fn handler_selection(
        &self,
        accuracy: AccuracyCriterion,
        power: PowerCriterion,
    ) -> Result<Vec<HandlerType>, ErrorCode> {
        let selection: Vec<HandlerType> = self
            .config
            .policy
            .lookup(accuracy, power)
            .iter()
            .copied()
            .filter(|kind| self.handlers.is_available(*kind))
            .collect();

        if selection.is_empty() {
            tracing::debug!(accuracy = %accuracy, power = %power, "No handler satisfies criteria");
            return Err(ErrorCode::NotAvailable);
        }
        Ok(selection)
    }

    /// Start tracking on every handler in `selection` not already tracked by
    /// the engine.
    ///
    /// Handlers that fail to start are skipped. Fails with the first error
    /// if none could be enabled.
    pub fn enable_handlers(&self, selection: &[HandlerType]) -> Result<EnabledHandlers, ErrorCode> {
        let mut enabled = EnabledHandlers::default();
        let mut first_error = None;

        for &requested in selection {
            let kind = canonical(requested);
            if enabled.keys.contains(&kind) {
                continue;
            }
            if self.state.lock().watchers.get(&kind).copied().unwrap_or(0) > 0 {
                enabled.keys.push(kind);
                continue;
            }

            match self.enable(kind) {
                Ok(()) => {
                    enabled.keys.push(kind);
                    enabled.started.push(kind);
                }
                Err(e) => {
                    tracing::debug!(handler = %kind, error = %e, "Handler not enabled for criteria");
                    first_error.get_or_insert(e);
                }
            }
        }

        if enabled.keys.is_empty() {
            return Err(first_error.unwrap_or(ErrorCode::NotAvailable));
        }
        Ok(enabled)
    }

    fn relay(&self) -> FixSink {
        Arc::new(EngineRelay {
            state: Arc::downgrade(&self.state),
        })
    }

    fn enable(&self, kind: HandlerType) -> Result<(), ErrorCode> {
        let handler = self.handlers.route(kind)?;
        handler.start(kind)?;
        if let Err(e) = handler.start_tracking(Some(self.relay()), kind) {
            let _ = handler.stop(kind);
            return Err(e);
        }
        tracing::info!(handler = %kind, "Criteria tracking enabled");
        Ok(())
    }

    fn disable(&self, kind: HandlerType) {
        let Some(handler) = self.handlers.get(kind) else {
            return;
        };
        if let Err(e) = handler.start_tracking(None, kind) {
            tracing::warn!(handler = %kind, error = %e, "Failed to disable criteria tracking");
        }
        match handler.stop(kind) {
            Ok(()) => tracing::info!(handler = %kind, "Criteria tracking released"),
            Err(e) => tracing::debug!(handler = %kind, error = %e, "Handler left running"),
        }
    }

    /// Subscribe `subscriber` to fixes meeting `criteria`.
    ///
    /// Returns the handlers the subscriber watches. On failure nothing is
    /// registered and the caller should reply once with the error.
    pub fn start_criteria_tracking(
        &self,
        subscriber: SubscriberId,
        sink: FixSink,
        criteria: Criteria,
    ) -> Result<Vec<HandlerType>, ErrorCode> {
        let min_distance_m = criteria.min_distance_m.unwrap_or(self.config.min_distance_m);
        if !(min_distance_m >= 0.0) {
            return Err(ErrorCode::WrongParameter);
        }
        let min_interval = criteria.min_interval.unwrap_or(self.config.min_interval);

        let _guard = self.lifecycle.lock();
        if self.state.lock().requests.contains_key(&subscriber) {
            return Err(ErrorCode::DuplicateRequest);
        }

        let selection = self.handler_selection(criteria.accuracy, criteria.power)?;

        // Registered before tracking is enabled so a fix reported during
        // the enable call reaches this subscriber.
        let mut candidates: Vec<HandlerType> = Vec::new();
        for kind in selection.iter().map(|kind| canonical(*kind)) {
            if !candidates.contains(&kind) {
                candidates.push(kind);
            }
        }
        self.state.lock().requests.insert(
            subscriber,
            CriteriaRequest::new(subscriber, sink, candidates, min_distance_m, min_interval),
        );

        let enabled = match self.enable_handlers(&selection) {
            Ok(enabled) => enabled,
            Err(e) => {
                self.state.lock().requests.remove(&subscriber);
                return Err(e);
            }
        };

        let mut state = self.state.lock();
        for kind in &enabled.keys {
            *state.watchers.entry(*kind).or_default() += 1;
        }
        if let Some(request) = state.requests.get_mut(&subscriber) {
            request.set_handlers(enabled.keys.clone());
        }
        drop(state);

        tracing::info!(
            subscriber = %subscriber,
            accuracy = %criteria.accuracy,
            power = %criteria.power,
            handlers = ?enabled.keys,
            "Criteria subscriber added"
        );
        Ok(enabled.keys)
    }

    /// Feed a fix into the engine as if a tracked handler produced it.
    pub fn on_fix(&self, fix: Fix) {
        route_fix(&self.state, fix);
    }

    /// Drop `subscriber`'s state. Handlers nobody watches any more are
    /// released. Returns false if the subscriber was unknown.
    pub fn remove_message_from_criteria_req_list(&self, subscriber: SubscriberId) -> bool {
        let _guard = self.lifecycle.lock();
        let released = {
            let mut state = self.state.lock();
            let Some(request) = state.requests.remove(&subscriber) else {
                return false;
            };

            let mut released = Vec::new();
            for kind in request.handlers() {
                if let Some(count) = state.watchers.get_mut(kind) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        state.watchers.remove(kind);
                        released.push(*kind);
                    }
                }
            }
            released
        };

        for kind in released {
            self.disable(kind);
        }
        tracing::info!(subscriber = %subscriber, "Criteria subscriber removed");
        true
    }

    /// Remove every subscriber. Called on shutdown.
    pub fn stop_all(&self) {
        let subscribers: Vec<SubscriberId> = self.state.lock().requests.keys().copied().collect();
        for subscriber in subscribers {
            self.remove_message_from_criteria_req_list(subscriber);
        }
    }

    pub fn is_subscribed(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().requests.contains_key(&subscriber)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Number of subscribers watching `kind`.
    pub fn watchers(&self, kind: HandlerType) -> usize {
        self.state.lock().watchers.get(&kind).copied().unwrap_or(0)
    }

    /// Last forwarded coordinates for `subscriber`.
    pub fn last_reported(&self, subscriber: SubscriberId) -> Option<(f64, f64)> {
        self.state
            .lock()
            .requests
            .get(&subscriber)
            .filter(|req| !req.is_first_reply())
            .map(|req| req.last_position())
    }
}
