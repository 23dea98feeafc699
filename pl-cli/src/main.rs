//! ParcelLive CLI - Command-line interface for the realtime client.
//!
//! Provides a terminal client for the ParcelLive realtime channel. Useful
//! for headless operation, scripting, and debugging connectivity against
//! an assessment collaboration server.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::error::PlResult;
use pl_core::logging;

/// ParcelLive - realtime collaboration client for property assessment.
#[derive(Parser)]
#[command(
    name = "parcellive",
    version,
    about = "ParcelLive realtime client CLI",
    long_about = "A command-line interface for the ParcelLive realtime channel.\n\
                   Connect to an assessment collaboration server to stream live updates\n\
                   and inspect connection health."
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
    /// Connect to the server and stream live updates.
    Connect {
        /// Server address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
        /// User identifier for the post-handshake auth message.
        #[arg(short = 'u', long)]
        user_id: Option<u64>,
        /// Display name sent alongside the user identifier.
        #[arg(short = 'n', long)]
        user_name: Option<String>,
        /// Save connection settings to the config file.
        #[arg(long)]
        save: bool,
    },
    /// Show the current configuration and probe connectivity.
    Status,
    /// View client logs.
    Logs {
        /// Number of log lines to show.
        #[arg(short = 'n', long, default_value = "50")]
        count: u32,
        /// Filter log level (trace, debug, info, warn, error).
        #[arg(short, long)]
        level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> PlResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_deref().map(std::path::Path::new);
    let mut config = if let Some(path) = config_path {
        AppConfig::load_from_file(path)?
    } else {
        AppConfig::load_default()?
    };

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let _guard = logging::init_logging(&config.logging, &log_dir)?;

    let config_handle = ConfigHandle::new(config);

    info!("ParcelLive CLI v{}", pl_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Connect { address, user_id, user_name, save } => {
            commands::connect::run(config_handle, address, user_id, user_name, save).await
        }
        Commands::Status => {
            commands::status::run(config_handle, cli.format).await
        }
        Commands::Logs { count, level } => {
            commands::logs::run(config_handle, count, level, cli.format).await
        }
    }
}
