//! CLI command implementations

use anyhow::Context;
use clap::Subcommand;
use drivecast_core::config::DrivecastConfig;
use drivecast_core::{FileId, RuntimeMode, extract_file_id};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Server {
        /// Host to bind to (overrides DRIVECAST_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides DRIVECAST_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Serve the built-in simulated drive instead of the real provider
        #[arg(long)]
        demo: bool,
    },
    /// Print the file id the relay would use for a share link or raw id
    Extract {
        /// Share link or file id
        input: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server { host, port, demo } => start_server(host, port, demo).await,
        Commands::Extract { input } => extract(&input),
    }
}

/// Start the relay server
///
/// Configuration comes from `.env.local`, `.env`, and the process environment;
/// flags override the bind address.
///
/// # Errors
/// - Provider construction failed (bad provider base URL)
/// - The listener could not bind or the server stopped with an I/O error
pub async fn start_server(host: Option<String>, port: Option<u16>, demo: bool) -> anyhow::Result<()> {
    DrivecastConfig::load_dotenv();
    let mut config = DrivecastConfig::from_env();
    apply_overrides(&mut config, host, port);

    let mode = if demo {
        RuntimeMode::Development
    } else {
        RuntimeMode::Production
    };

    info!("Binding relay to {}", config.server.bind_address());
    drivecast_web::run_server(config, mode)
        .await
        .context("relay server failed")
}

fn apply_overrides(config: &mut DrivecastConfig, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

/// Print the extracted file id, or why the relay would reject it
///
/// # Errors
/// - The input yields no id or an id with disallowed characters
fn extract(input: &str) -> anyhow::Result<()> {
    let candidate = extract_file_id(input);
    let id = FileId::parse(input).with_context(|| format!("cannot use '{candidate}' as a file id"))?;
    println!("{id}");
    Ok(())
}
