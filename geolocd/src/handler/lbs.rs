//! Location-based-services handler: geocoding only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{FixSink, HandlerState, HandlerType, PositionHandler};
use crate::error::ErrorCode;
use crate::position::{Accuracy, FixResult, Position};
use crate::wsp::{GeocodeQuery, GeocodeSink, WebServiceProvider, WspRegistry};

/// Geocoding handler. Forwards lookups to the active web-service provider.
pub struct LbsHandler {
    registry: Arc<WspRegistry>,
    provider: String,
    started: AtomicBool,
}

impl LbsHandler {
    pub fn new(registry: Arc<WspRegistry>, provider: impl Into<String>) -> Self {
        Self {
            registry,
            provider: provider.into(),
            started: AtomicBool::new(false),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    fn provider(&self) -> Result<Arc<dyn WebServiceProvider>, ErrorCode> {
        self.registry.lookup(&self.provider).ok_or_else(|| {
            tracing::debug!(provider = %self.provider, "Geocode provider not registered");
            ErrorCode::NotAvailable
        })
    }
}

impl PositionHandler for LbsHandler {
    fn kind(&self) -> HandlerType {
        HandlerType::Lbs
    }

    fn is_available(&self, _handler: HandlerType) -> bool {
        self.registry.lookup(&self.provider).is_some()
    }

    fn state(&self, _handler: HandlerType) -> HandlerState {
        if self.started.load(Ordering::Acquire) {
            HandlerState::Started
        } else {
            HandlerState::Idle
        }
    }

    fn start(&self, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.provider()?;
        if !self.started.swap(true, Ordering::AcqRel) {
            tracing::info!(provider = %self.provider, "Geocode handler started");
        }
        Ok(())
    }

    fn stop(&self, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    fn get_position(&self, _sink: Option<FixSink>, _handler: HandlerType) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn start_tracking(
        &self,
        _sink: Option<FixSink>,
        _handler: HandlerType,
    ) -> Result<(), ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn get_last_position(&self, _handler: HandlerType) -> FixResult {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn get_accuracy(&self, _handler: HandlerType) -> Result<Accuracy, ErrorCode> {
        Err(ErrorCode::NotApplicableToThisHandler)
    }

    fn get_geocode(&self, query: GeocodeQuery, sink: Option<GeocodeSink>) -> Result<(), ErrorCode> {
        self.provider()?.geocode(query, sink)
    }

    fn get_reverse_geocode(
        &self,
        position: Position,
        sink: Option<GeocodeSink>,
    ) -> Result<(), ErrorCode> {
        self.provider()?.reverse_geocode(position, sink)
    }
}
