//! Vidarr CLI - Command-line client for a Vidarr media download server.
//!
//! Provides a headless client that follows the server's event stream
//! from the terminal, prints download activity as it happens, and raises
//! desktop alerts when download batches finish.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use vd_core::config::{AppConfig, ConfigHandle};
use vd_core::error::VdResult;
use vd_core::logging;

/// Vidarr - headless client for a self-hosted media download server.
#[derive(Parser)]
#[command(
    name = "vidarr",
    version,
    about = "Vidarr media server client CLI",
    long_about = "A command-line client for a self-hosted Vidarr media download server.\n\
                   Follows the server's event stream and raises desktop alerts when downloads finish."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the Vidarr server and follow its event stream.
    Connect {
        /// Server address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
        /// Save connection settings to the config file.
        #[arg(long)]
        save: bool,
    },
    /// View and modify configuration.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Check the local environment and server reachability.
    Doctor,
}

#[tokio::main]
async fn main() -> VdResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        AppConfig::load_from_file(std::path::Path::new(path))?
    } else {
        AppConfig::load_default()?
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let log_dir = config.effective_log_dir()?;
    let _guard = logging::init_logging(&log_level, &log_dir, config.logging.json_output)?;

    let config_handle = ConfigHandle::new(config);

    info!("Vidarr CLI v{}", vd_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Connect { address, save } => {
            commands::connect::run(config_handle, address, save).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, action, cli.format).await
        }
        Commands::Doctor => commands::doctor::run(config_handle, cli.format).await,
    }
}
