//! One-off geocoding through the configured web-service provider.
//!
//! Runs in-process against a fresh context; no daemon is needed.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use geolocd::service::{ClientId, LocationService, Reply, Request};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Client id used for in-process requests.
const LOCAL_CLIENT: ClientId = ClientId(0);

#[derive(Debug, Args)]
pub struct GeocodeArgs {
    /// Free-form address to resolve
    pub address: String,

    /// Configuration file (default: ~/.geolocd/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ReverseArgs {
    /// Latitude in decimal degrees
    #[arg(allow_negative_numbers = true)]
    pub latitude: f64,

    /// Longitude in decimal degrees
    #[arg(allow_negative_numbers = true)]
    pub longitude: f64,

    /// Configuration file (default: ~/.geolocd/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run_geocode(args: GeocodeArgs) -> Result<(), CliError> {
    resolve(
        args.config,
        "geocode",
        Request::GetGeoCodeLocation {
            address: args.address,
        },
    )
}

pub fn run_reverse(args: ReverseArgs) -> Result<(), CliError> {
    resolve(
        args.config,
        "reverse",
        Request::GetReverseLocation {
            latitude: args.latitude,
            longitude: args.longitude,
        },
    )
}

fn resolve(config: Option<PathBuf>, command: &str, request: Request) -> Result<(), CliError> {
    let runner = CliRunner::new(config.as_deref(), false, false)?;
    runner.log_startup(command);
    let runtime = runner.runtime()?;

    let reply = runtime.block_on(async {
        let context = Arc::new(runner.create_context()?);
        let service = LocationService::new(Arc::clone(&context));

        let mut replies = service.handle(LOCAL_CLIENT, request);
        let reply = replies.recv().await;
        context.shutdown();
        Ok::<_, CliError>(reply)
    })?;

    print_reply(reply)
}

fn print_reply(reply: Option<Reply>) -> Result<(), CliError> {
    let reply = reply.ok_or_else(|| CliError::Request {
        code: geolocd::error::ErrorCode::NotAvailable.code(),
        text: "no reply".to_string(),
    })?;

    if reply.is_error() {
        return Err(CliError::Request {
            code: reply.error_code.unwrap_or_default(),
            text: reply.error_text.unwrap_or_default(),
        });
    }

    let json = serde_json::to_string_pretty(&reply)
        .map_err(|e| CliError::Runtime(std::io::Error::other(e)))?;
    println!("{}", json);
    Ok(())
}
