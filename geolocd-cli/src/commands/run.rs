//! Run command - serve the location service until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use geolocd::ipc::IpcServer;
use geolocd::service::LocationService;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Configuration file (default: ~/.geolocd/config.ini)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Socket path, overriding [daemon] socket
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log to the log file only
    #[arg(long)]
    pub quiet: bool,
}

/// Run the daemon.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref(), !args.quiet, args.debug)?;
    runner.log_startup("run");

    let socket = args
        .socket
        .unwrap_or_else(|| runner.config().daemon.socket.clone());
    let runtime = runner.runtime()?;

    runtime.block_on(async {
        let context = Arc::new(runner.create_context()?);
        let service = Arc::new(LocationService::new(Arc::clone(&context)));

        let server = IpcServer::new(&socket, service);
        let listener = server.bind().await?;
        info!(socket = %socket.display(), "geolocd listening");
        println!("geolocd v{} listening on {}", geolocd::VERSION, socket.display());
        println!("Press Ctrl+C to stop");

        let shutdown = CancellationToken::new();
        let mut server_task = tokio::spawn(server.serve(listener, shutdown.clone()));

        let finished = tokio::select! {
            signal = shutdown_signal() => {
                match signal {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => warn!(error = %e, "Signal handler failed, shutting down"),
                }
                None
            }
            finished = &mut server_task => {
                warn!("IPC server stopped before a shutdown signal");
                Some(finished)
            }
        };
        shutdown.cancel();

        let finished = match finished {
            Some(finished) => finished,
            None => server_task.await,
        };
        let result = match finished {
            Ok(result) => result.map_err(CliError::from),
            Err(e) => {
                warn!(error = %e, "IPC server task failed");
                Ok(())
            }
        };

        context.shutdown();
        println!("geolocd stopped");
        result
    })
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
