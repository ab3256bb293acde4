//! Web-service providers for geocoding and reverse geocoding.
//!
//! Providers are configured from a JSON document (see [`WspConfig`]), built
//! once at startup and registered by name in a [`WspRegistry`] owned by the
//! application context. Each provider validates a request before any network
//! traffic: a result sink must be supplied, the feature must be declared and
//! a license key must be present. Accepted requests are signed and submitted
//! through the shared [`HttpTransport`](crate::http::HttpTransport).

mod config;
mod generic;
mod google;
mod provider;
mod registry;
mod signing;
mod types;

pub use config::{WspConfig, WspConfigError, WspRecord};
pub use generic::GenericWsp;
pub use google::GoogleWsp;
pub use provider::WebServiceProvider;
pub use registry::WspRegistry;
pub use signing::sign_url;
pub use types::{
    geocode_channel, Address, FeatureSet, GeocodeQuery, GeocodeReceiver, GeocodeResult,
    GeocodeSink, WspFeature,
};
