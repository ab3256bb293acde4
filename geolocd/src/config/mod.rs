//! Configuration for the location daemon.
//!
//! Three sources feed the daemon:
//!
//! - `~/.geolocd/config.ini`, parsed into a [`ConfigFile`]
//! - the GPS parameter file, a sectionless `KEY=value` list parsed into
//!   [`GpsParameters`]
//! - the web-service provider JSON document, see [`crate::wsp::WspConfig`]
//!
//! Settings structs live in `settings`, constants in `defaults`, INI parsing
//! in `parser` and serialization in `writer`.

mod defaults;
mod file;
mod gps;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use gps::GpsParameters;
pub use settings::{
    ConfigFile, CriteriaSettings, DaemonSettings, GpsSettings, LoggingSettings, PluginSettings,
    StorageSettings, WspSettings,
};
