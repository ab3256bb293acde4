//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use geolocd::config::ConfigFileError;
use geolocd::context::ContextError;
use geolocd::ipc::IpcError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(ConfigFileError),
    /// Failed to build the daemon context
    Context(ContextError),
    /// IPC server error
    Ipc(IpcError),
    /// Could not reach a running daemon
    Connect { path: PathBuf, error: std::io::Error },
    /// The daemon or provider answered with an error reply
    Request { code: i32, text: String },
    /// Failed to start the async runtime or talk over the socket
    Runtime(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Ipc(IpcError::InUse(path)) => {
                eprintln!();
                eprintln!("Another geolocd instance is serving {}.", path.display());
                eprintln!("Stop it first, or pass --socket to use a different path.");
            }
            CliError::Connect { .. } => {
                eprintln!();
                eprintln!("Is the daemon running? Start it with: geolocd run");
            }
            CliError::Context(ContextError::Wsp(_)) => {
                eprintln!();
                eprintln!("Check the provider file named by [wsp] config in the config file.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Context(e) => write!(f, "Failed to start location service: {}", e),
            CliError::Ipc(e) => write!(f, "IPC server error: {}", e),
            CliError::Connect { path, error } => {
                write!(f, "Failed to connect to '{}': {}", path.display(), error)
            }
            CliError::Request { code, text } => write!(f, "Request failed ({}): {}", code, text),
            CliError::Runtime(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Context(e) => Some(e),
            CliError::Ipc(e) => Some(e),
            CliError::Connect { error, .. } => Some(error),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ContextError> for CliError {
    fn from(e: ContextError) -> Self {
        CliError::Context(e)
    }
}

impl From<IpcError> for CliError {
    fn from(e: IpcError) -> Self {
        CliError::Ipc(e)
    }
}
