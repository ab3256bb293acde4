//! geolocd CLI - location service daemon and client
//!
//! `geolocd run` serves the location service on a Unix socket; the other
//! subcommands manage configuration or talk to a running daemon.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::geocode::{GeocodeArgs, ReverseArgs};
use commands::query::QueryArgs;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "geolocd")]
#[command(version = geolocd::VERSION)]
#[command(about = "Location service daemon: GPS, network positioning and geocoding", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the location service until interrupted
    Run(RunArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Resolve an address to coordinates
    Geocode(GeocodeArgs),

    /// Resolve coordinates to an address
    Reverse(ReverseArgs),

    /// Send a request to a running daemon
    Query(QueryArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Config { command } => commands::config::run(command),
        Commands::Geocode(args) => commands::geocode::run_geocode(args),
        Commands::Reverse(args) => commands::geocode::run_reverse(args),
        Commands::Query(args) => commands::query::run(args),
    };

    if let Err(e) = result {
        e.exit();
    }
}
