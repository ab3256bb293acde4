//! geolocd - location service daemon core
//!
//! This library provides position handlers for GPS, Wi-Fi, cell and the
//! network composite, criteria-based tracking with a minimum-distance
//! filter, web-service geocoding providers and the IPC service that exposes
//! them to clients over a Unix socket.
//!
//! # High-Level API
//!
//! The [`context`] module wires everything from a config file, and the
//! [`service`] module answers client requests against that context:
//!
//! ```ignore
//! use geolocd::config::ConfigFile;
//! use geolocd::context::AppContext;
//! use geolocd::service::{ClientId, LocationService, Request};
//!
//! let context = AppContext::from_config(&ConfigFile::load()?)?;
//! let service = LocationService::new(Arc::new(context));
//!
//! let mut replies = service.handle(ClientId(1), Request::GetCurrentPosition {
//!     handler: HandlerType::Gps,
//! });
//! let reply = replies.recv().await;
//! ```

pub mod config;
pub mod context;
pub mod criteria;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod http;
pub mod ipc;
pub mod logging;
pub mod plugin;
pub mod position;
pub mod service;
pub mod store;
pub mod time_sync;
pub mod wsp;

/// Version of the geolocd library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
