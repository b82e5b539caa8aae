//! GDrive CLI - command-line client for the sync engine.
//!
//! Provides commands for:
//! - Mirroring a local directory to a remote sync root (`sync upload`)
//! - Mirroring a remote sync root to a local directory (`sync download`)
//! - Listing sync roots and their content (`sync list`)
//! - Observing the remote change log (`changes`)
//! - Showing account and quota information (`about`)

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::about::AboutCommand;
use commands::changes::ChangesCommand;
use commands::sync::SyncCommand;

#[derive(Debug, Parser)]
#[command(name = "gdrive", version, about = "Google Drive client with bidirectional sync")]
pub struct Cli {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize files between a local directory and a remote sync root
    #[command(subcommand)]
    Sync(SyncCommand),
    /// List entries from the remote change log
    Changes(ChangesCommand),
    /// Show account and storage quota information
    About(AboutCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync(cmd) => cmd.execute().await,
        Commands::Changes(cmd) => cmd.execute().await,
        Commands::About(cmd) => cmd.execute().await,
    }
}
