//! Drivecast CLI - Command-line interface
//!
//! Runs the relay server and exposes the share-link extraction used by it.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use drivecast_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "drivecast")]
#[command(about = "Range-preserving relay for cloud drive media")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Also write a debug log of this run into the given directory
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;
    commands::handle_command(cli.command).await?;

    Ok(())
}
