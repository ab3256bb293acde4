//! Query a running daemon over its socket.
//!
//! Each subcommand sends one request line and prints the replies as they
//! arrive. Streaming requests print `--count` replies and then disconnect,
//! which ends the subscription on the daemon side.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use geolocd::config::{config_file_path, ConfigFile};
use geolocd::criteria::{AccuracyCriterion, PowerCriterion};
use geolocd::handler::HandlerType;
use geolocd::ipc::encode_request;
use geolocd::service::Request;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::CliError;

const REQUEST_ID: u64 = 1;

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Daemon socket (default: [daemon] socket from the config file)
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: QueryCommands,
}

#[derive(Debug, Subcommand)]
pub enum QueryCommands {
    /// Request a single fix
    Position {
        #[arg(long, default_value = "gps")]
        handler: HandlerType,
    },

    /// Print the last stored fix
    Last {
        #[arg(long, default_value = "gps")]
        handler: HandlerType,
    },

    /// Show handler state
    State {
        #[arg(long, default_value = "gps")]
        handler: HandlerType,
    },

    /// Stream fixes from one handler
    Track {
        #[arg(long, default_value = "gps")]
        handler: HandlerType,

        /// Number of fixes to print before disconnecting
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Stream fixes chosen by accuracy and power
    Criteria {
        #[arg(long, default_value = "fine")]
        accuracy: AccuracyCriterion,

        #[arg(long, default_value = "high")]
        power: PowerCriterion,

        /// Minimum movement in meters between fixes
        #[arg(long)]
        min_distance: Option<f64>,

        /// Number of fixes to print before disconnecting
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Stream GPS satellite reports
    Satellites {
        /// Number of reports to print before disconnecting
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

impl QueryCommands {
    fn into_request(self) -> (Request, usize) {
        match self {
            QueryCommands::Position { handler } => (Request::GetCurrentPosition { handler }, 1),
            QueryCommands::Last { handler } => (Request::GetLastPosition { handler }, 1),
            QueryCommands::State { handler } => (Request::GetState { handler }, 1),
            QueryCommands::Track { handler, count } => (Request::StartTracking { handler }, count),
            QueryCommands::Criteria {
                accuracy,
                power,
                min_distance,
                count,
            } => (
                Request::StartTrackingCriteria {
                    accuracy,
                    power,
                    min_distance,
                    min_interval_ms: None,
                },
                count,
            ),
            QueryCommands::Satellites { count } => (Request::GetGpsSatelliteData, count),
        }
    }
}

pub fn run(args: QueryArgs) -> Result<(), CliError> {
    let socket = match args.socket {
        Some(socket) => socket,
        None => ConfigFile::load_from(&config_file_path())?.daemon.socket,
    };
    let (request, count) = args.command.into_request();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(exchange(&socket, &request, count))
}

/// Send `request` and print up to `count` replies.
///
/// Stops early on an error reply or when the daemon closes the stream.
async fn exchange(socket: &Path, request: &Request, count: usize) -> Result<(), CliError> {
    let stream = UnixStream::connect(socket)
        .await
        .map_err(|error| CliError::Connect {
            path: socket.to_path_buf(),
            error,
        })?;
    let (read, mut write) = stream.into_split();

    let line = encode_request(Some(REQUEST_ID), request)
        .map_err(|e| CliError::Runtime(std::io::Error::other(e)))?;
    write.write_all(line.as_bytes()).await.map_err(CliError::Runtime)?;

    let mut lines = BufReader::new(read).lines();
    for _ in 0..count {
        let Some(line) = lines.next_line().await.map_err(CliError::Runtime)? else {
            break;
        };
        println!("{}", line);

        let reply: Value = serde_json::from_str(&line)
            .map_err(|e| CliError::Runtime(std::io::Error::other(e)))?;
        if reply["returnValue"] == Value::Bool(false) {
            return Err(CliError::Request {
                code: reply["errorCode"].as_i64().unwrap_or_default() as i32,
                text: reply["errorText"].as_str().unwrap_or_default().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use geolocd::context::AppContext;
    use geolocd::ipc::IpcServer;
    use geolocd::service::LocationService;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_streaming_commands_use_count() {
        let (request, count) = QueryCommands::Track {
            handler: HandlerType::Wifi,
            count: 3,
        }
        .into_request();
        assert_eq!(
            request,
            Request::StartTracking {
                handler: HandlerType::Wifi
            }
        );
        assert_eq!(count, 3);

        let (_, count) = QueryCommands::State {
            handler: HandlerType::Gps,
        }
        .into_request();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_exchange_reports_error_reply() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("geolocd.sock");

        let context = Arc::new(AppContext::builder().build());
        let service = Arc::new(LocationService::new(context));
        let server = IpcServer::new(&path, service);
        let listener = server.bind().await.unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve(listener, shutdown.clone()));

        let ok = exchange(
            &path,
            &Request::GetState {
                handler: HandlerType::Gps,
            },
            1,
        )
        .await;
        assert!(ok.is_ok());

        // No Wi-Fi source is loaded.
        let err = exchange(
            &path,
            &Request::GetCurrentPosition {
                handler: HandlerType::Wifi,
            },
            1,
        )
        .await;
        assert!(matches!(err, Err(CliError::Request { .. })));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_exchange_without_daemon() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.sock");

        let err = exchange(&path, &Request::GetGpsSatelliteData, 1).await;
        assert!(matches!(err, Err(CliError::Connect { .. })));
    }
}
