//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`geocode`] - One-off forward and reverse geocoding
//! - [`query`] - Requests against a running daemon
//! - [`run`] - Main command (serve the location service)

pub mod config;
pub mod geocode;
pub mod query;
pub mod run;
