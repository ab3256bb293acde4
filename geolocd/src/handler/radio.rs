//! Single-plugin handlers for the Wi-Fi, cell and hybrid sources.

use std::sync::Arc;

use super::lifecycle::HandlerCore;
use super::{FixSink, HandlerState, HandlerType, PositionHandler};
use crate::error::ErrorCode;
use crate::plugin::{PluginListener, PositionPlugin};
use crate::position::FixResult;
use crate::store::PositionStore;

struct RadioInner {
    core: HandlerCore,
    plugin: Option<Arc<dyn PositionPlugin>>,
}

impl PluginListener for RadioInner {
    fn on_position(&self, result: FixResult) {
        self.core.deliver(result);
    }
}

/// Handler for a single network radio source (Wi-Fi, Cell or Hybrid).
pub struct RadioHandler {
    inner: Arc<RadioInner>,
}

impl RadioHandler {
    pub fn new(
        kind: HandlerType,
        plugin: Option<Arc<dyn PositionPlugin>>,
        store: Option<Arc<dyn PositionStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(RadioInner {
                core: HandlerCore::new(kind, store),
                plugin,
            }),
        }
    }

    fn plugin(&self) -> Option<&dyn PositionPlugin> {
        self.inner.plugin.as_deref()
    }
}

impl PositionHandler for RadioHandler {
    fn kind(&self) -> HandlerType {
        self.inner.core.kind()
    }

    fn is_available(&self, _handler: HandlerType) -> bool {
        self.inner.plugin.is_some()
    }

    fn state(&self, _handler: HandlerType) -> HandlerState {
        self.inner.core.state()
    }

    fn start(&self, _handler: HandlerType) -> Result<(), ErrorCode> {
        let listener: Arc<dyn PluginListener> = self.inner.clone();
        self.inner.core.start(self.plugin(), &listener).map(|_| ())
    }

    fn stop(&self, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.inner.core.stop(self.plugin()).map(|_| ())
    }

    fn get_position(&self, sink: Option<FixSink>, _handler: HandlerType) -> Result<(), ErrorCode> {
        self.inner.core.get_position(self.plugin(), sink)
    }

    fn start_tracking(
        &self,
        sink: Option<FixSink>,
        _handler: HandlerType,
    ) -> Result<(), ErrorCode> {
        self.inner.core.start_tracking(self.plugin(), sink)
    }

    fn get_last_position(&self, _handler: HandlerType) -> FixResult {
        self.inner.core.last_position()
    }
}
