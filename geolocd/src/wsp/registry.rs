//! Registry of configured web-service providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::config::WspConfig;
use super::generic::GenericWsp;
use super::google::GoogleWsp;
use super::provider::WebServiceProvider;
use super::types::FeatureSet;
use crate::http::HttpTransport;

struct Registered {
    provider: Arc<dyn WebServiceProvider>,
    features: FeatureSet,
}

/// Name → provider map.
///
/// Registration is expected to happen at startup before request traffic;
/// lookups are cheap and can run concurrently.
#[derive(Default)]
pub struct WspRegistry {
    providers: RwLock<BTreeMap<String, Registered>>,
}

impl WspRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register one provider per config record. Records named
    /// `google` use the Google protocol, everything else the generic one.
    pub fn from_config(config: &WspConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let registry = Self::new();
        for record in &config.providers {
            let provider: Arc<dyn WebServiceProvider> = if record.name.eq_ignore_ascii_case("google") {
                Arc::new(GoogleWsp::new(record.clone(), Arc::clone(&transport)))
            } else {
                Arc::new(GenericWsp::new(record.clone(), Arc::clone(&transport)))
            };
            registry.register(provider);
        }
        registry
    }

    /// Register `provider` under its name. Returns false if the name is taken.
    pub fn register(&self, provider: Arc<dyn WebServiceProvider>) -> bool {
        let name = provider.name().to_string();
        let features = provider.publish_features();

        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            tracing::warn!(provider = %name, "Web service provider already registered");
            return false;
        }

        tracing::info!(provider = %name, features = ?features, "Web service provider registered");
        providers.insert(name, Registered { provider, features });
        true
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn WebServiceProvider>> {
        let removed = self.providers.write().remove(name).map(|r| r.provider);
        if removed.is_some() {
            tracing::debug!(provider = name, "Web service provider unregistered");
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn WebServiceProvider>> {
        self.providers
            .read()
            .get(name)
            .map(|r| Arc::clone(&r.provider))
    }

    /// Features declared by `name` at registration.
    pub fn features(&self, name: &str) -> Option<FeatureSet> {
        self.providers.read().get(name).map(|r| r.features)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Drop every provider. Called on shutdown.
    pub fn clear(&self) {
        let mut providers = self.providers.write();
        if !providers.is_empty() {
            tracing::debug!(count = providers.len(), "Clearing web service providers");
        }
        providers.clear();
    }
}
