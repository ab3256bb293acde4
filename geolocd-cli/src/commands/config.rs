//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::PathBuf;

use clap::Subcommand;
use geolocd::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration (file values over defaults)
    Show {
        /// Configuration file (default: ~/.geolocd/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Configuration file (default: ~/.geolocd/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(),
        ConfigCommands::Show { config } => run_show(config),
        ConfigCommands::Init { config, force } => run_init(config, force),
    }
}

fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

fn run_show(path: Option<PathBuf>) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);
    let config = ConfigFile::load_from(&path)?;
    print!("{}", config.render());
    Ok(())
}

fn run_init(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);

    if force {
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
    } else if ConfigFile::ensure_exists(&path)? {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}
