//! Per-subscriber criteria state and the distance filter.

use std::fmt;
use std::time::{Duration, Instant};

use crate::handler::{FixSink, HandlerType};
use crate::position::{distance_m, Position};

/// Identity of one criteria-tracking subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Per-subscriber filter state.
pub struct CriteriaRequest {
    subscriber: SubscriberId,
    sink: FixSink,
    handlers: Vec<HandlerType>,
    last_latitude: f64,
    last_longitude: f64,
    last_request_time: Option<Instant>,
    first_reply: bool,
    min_distance_m: f64,
    min_interval: Duration,
}

impl CriteriaRequest {
    pub fn new(
        subscriber: SubscriberId,
        sink: FixSink,
        handlers: Vec<HandlerType>,
        min_distance_m: f64,
        min_interval: Duration,
    ) -> Self {
        Self {
            subscriber,
            sink,
            handlers,
            last_latitude: 0.0,
            last_longitude: 0.0,
            last_request_time: None,
            first_reply: true,
            min_distance_m,
            min_interval,
        }
    }

    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    pub fn sink(&self) -> &FixSink {
        &self.sink
    }

    /// Handlers whose fixes this subscriber receives.
    pub fn handlers(&self) -> &[HandlerType] {
        &self.handlers
    }

    /// Narrow the watched handlers to `handlers`.
    pub fn set_handlers(&mut self, handlers: Vec<HandlerType>) {
        self.handlers = handlers;
    }

    pub fn watches(&self, kind: HandlerType) -> bool {
        self.handlers.contains(&kind)
    }

    /// Latitude and longitude of the last forwarded fix.
    pub fn last_position(&self) -> (f64, f64) {
        (self.last_latitude, self.last_longitude)
    }

    pub fn is_first_reply(&self) -> bool {
        self.first_reply
    }

    /// Whether `position` carries new information for this subscriber.
    ///
    /// The first reply always passes. After that a fix must come at least
    /// `min_interval` after the previous one and lie at least
    /// `min_distance_m` (haversine) from it.
    pub fn should_forward(&self, position: &Position, now: Instant) -> bool {
        if self.first_reply {
            return true;
        }
        if let Some(last) = self.last_request_time {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        let moved = distance_m(
            (self.last_latitude, self.last_longitude),
            (position.latitude(), position.longitude()),
        );
        moved >= self.min_distance_m
    }

    /// Remember `position` as the last forwarded fix.
    pub fn record(&mut self, position: &Position, now: Instant) {
        self.last_latitude = position.latitude();
        self.last_longitude = position.longitude();
        self.last_request_time = Some(now);
        self.first_reply = false;
    }
}

impl fmt::Debug for CriteriaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriteriaRequest")
            .field("subscriber", &self.subscriber)
            .field("handlers", &self.handlers)
            .field("last_latitude", &self.last_latitude)
            .field("last_longitude", &self.last_longitude)
            .field("first_reply", &self.first_reply)
            .field("min_distance_m", &self.min_distance_m)
            .finish_non_exhaustive()
    }
}
