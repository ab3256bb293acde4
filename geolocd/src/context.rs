//! Application context.
//!
//! Owns every long-lived component of the daemon: the handler table, the
//! criteria engine, the web-service provider registry and the position
//! store. Components receive what they need from here at construction
//! instead of reaching for process globals.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ConfigFile, ConfigFileError, GpsParameters};
use crate::criteria::{CriteriaConfig, CriteriaEngine};
use crate::handler::{
    GpsHandler, GpsHandlerConfig, Handler, HandlerTable, HandlerType, LbsHandler, NetworkHandler,
    RadioHandler,
};
use crate::http::{AsyncReqwestClient, HttpError, HttpTransactionManager, HttpTransport};
use crate::plugin::{GnssPlugin, PluginSet, PositionPlugin, ReplayError, ReplayPlugin};
use crate::store::{JsonFileStore, MemoryStore, PositionStore, StoreError};
use crate::wsp::{WspConfig, WspConfigError, WspRegistry};

/// Errors building the context from configuration.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Wsp(#[from] WspConfigError),

    #[error(transparent)]
    Plugin(#[from] ReplayError),

    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] HttpError),
}

/// Builder for [`AppContext`].
pub struct AppContextBuilder {
    criteria: CriteriaConfig,
    gps: GpsHandlerConfig,
    plugins: PluginSet,
    store: Option<Arc<dyn PositionStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
    wsp: WspConfig,
    wsp_provider: String,
}

impl Default for AppContextBuilder {
    fn default() -> Self {
        Self {
            criteria: CriteriaConfig::default(),
            gps: GpsHandlerConfig::default(),
            plugins: PluginSet::default(),
            store: None,
            transport: None,
            wsp: WspConfig::default(),
            wsp_provider: crate::config::DEFAULT_WSP_PROVIDER.to_string(),
        }
    }
}

impl AppContextBuilder {
    pub fn criteria(mut self, config: CriteriaConfig) -> Self {
        self.criteria = config;
        self
    }

    /// GPS defaults. The store and transport set on this builder take
    /// precedence over the ones in `config`.
    pub fn gps(mut self, config: GpsHandlerConfig) -> Self {
        self.gps = config;
        self
    }

    pub fn plugins(mut self, plugins: PluginSet) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn store(mut self, store: Arc<dyn PositionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn wsp(mut self, config: WspConfig, provider: impl Into<String>) -> Self {
        self.wsp = config;
        self.wsp_provider = provider.into();
        self
    }

    pub fn build(self) -> AppContext {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn PositionStore>);

        let registry = Arc::new(match &self.transport {
            Some(transport) => WspRegistry::from_config(&self.wsp, Arc::clone(transport)),
            None => WspRegistry::new(),
        });

        let mut gps = self.gps;
        gps.store = Some(Arc::clone(&store));
        if self.transport.is_some() {
            gps.transport = self.transport.clone();
        }

        let radio = |kind: HandlerType, plugin: Option<Arc<dyn PositionPlugin>>| {
            plugin.map(|p| RadioHandler::new(kind, Some(p), Some(Arc::clone(&store))))
        };

        let mut handlers = HandlerTable::new();
        handlers.insert(Handler::Gps(GpsHandler::new(self.plugins.gps.clone(), gps)));
        handlers.insert(Handler::Network(NetworkHandler::from_handlers(
            radio(HandlerType::Wifi, self.plugins.wifi.clone()),
            radio(HandlerType::Cell, self.plugins.cell.clone()),
            radio(HandlerType::Hybrid, self.plugins.hybrid.clone()),
        )));
        handlers.insert(Handler::Lbs(LbsHandler::new(
            Arc::clone(&registry),
            self.wsp_provider.clone(),
        )));
        let handlers = Arc::new(handlers);

        let criteria = CriteriaEngine::new(Arc::clone(&handlers), self.criteria);

        tracing::info!(
            plugins = ?self.plugins.loaded(),
            providers = ?registry.names(),
            wsp_provider = %self.wsp_provider,
            "Application context ready"
        );

        AppContext {
            handlers,
            criteria,
            registry,
            store,
            wsp_provider: self.wsp_provider,
        }
    }
}

/// Explicit application context.
pub struct AppContext {
    handlers: Arc<HandlerTable>,
    criteria: CriteriaEngine,
    registry: Arc<WspRegistry>,
    store: Arc<dyn PositionStore>,
    wsp_provider: String,
}

impl AppContext {
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::default()
    }

    /// Build the full daemon context from `config`.
    ///
    /// Loads the GPS parameter file, the provider JSON and every replay
    /// source it names. Must be called within a tokio runtime context for
    /// the HTTP transport to be usable.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ContextError> {
        let store: Arc<dyn PositionStore> = match &config.storage.last_position {
            Some(path) => Arc::new(JsonFileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        let parameters = match &config.gps.parameters {
            Some(path) => GpsParameters::load(path)?,
            None => GpsParameters::default(),
        };

        let wsp = match &config.wsp.config {
            Some(path) => WspConfig::load(path)?,
            None => WspConfig::default(),
        };

        let transport: Arc<dyn HttpTransport> =
            Arc::new(HttpTransactionManager::new(AsyncReqwestClient::new()?));

        let gps = GpsHandlerConfig {
            parameters,
            position_mode: config.gps.position_mode,
            fix_interval: Duration::from_millis(config.gps.fix_interval_ms),
            ..GpsHandlerConfig::default()
        };

        let criteria = CriteriaConfig {
            min_distance_m: config.criteria.min_distance_m,
            min_interval: Duration::from_millis(config.criteria.min_interval_ms),
            policy: config.criteria.policy.clone(),
        };

        Ok(Self::builder()
            .criteria(criteria)
            .gps(gps)
            .plugins(load_plugins(config)?)
            .store(store)
            .transport(transport)
            .wsp(wsp, config.wsp.provider.clone())
            .build())
    }

    pub fn handlers(&self) -> &Arc<HandlerTable> {
        &self.handlers
    }

    pub fn criteria(&self) -> &CriteriaEngine {
        &self.criteria
    }

    pub fn registry(&self) -> &Arc<WspRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn PositionStore> {
        &self.store
    }

    /// Provider used for geocoding.
    pub fn wsp_provider(&self) -> &str {
        &self.wsp_provider
    }

    /// Drop all criteria subscriptions and stop every handler.
    pub fn shutdown(&self) {
        self.criteria.stop_all();
        self.handlers.stop_all();
        tracing::info!("Application context shut down");
    }
}

fn load_plugins(config: &ConfigFile) -> Result<PluginSet, ReplayError> {
    let interval = Duration::from_millis(config.plugins.replay_interval_ms);
    let replay = |name: &str, path: &Option<std::path::PathBuf>| {
        path.as_deref()
            .map(|p| ReplayPlugin::load(name, p, interval).map(Arc::new))
            .transpose()
    };

    Ok(PluginSet {
        gps: replay("gps-replay", &config.plugins.gps)?.map(|p| p as Arc<dyn GnssPlugin>),
        wifi: replay("wifi-replay", &config.plugins.wifi)?.map(|p| p as Arc<dyn PositionPlugin>),
        cell: replay("cell-replay", &config.plugins.cell)?.map(|p| p as Arc<dyn PositionPlugin>),
        hybrid: replay("hybrid-replay", &config.plugins.hybrid)?
            .map(|p| p as Arc<dyn PositionPlugin>),
    })
}
