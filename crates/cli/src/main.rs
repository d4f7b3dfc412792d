mod commands;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

use noitlink_core::{load_config, validate_config, Config, SanitizedConfig};

use logging::LogFormat;

#[derive(Parser)]
#[command(
    name = "noitlink",
    version,
    about = "Manage checks on a noit daemon and ingest its metric journals"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(long, env = "NOITLINK_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage check definitions
    Check {
        #[command(subcommand)]
        command: CheckCommand,
    },
    /// Print the daemon version
    Version,
    /// Stream live samples for one check to stdout
    Live {
        /// Check UUID
        uuid: uuid::Uuid,
        /// Sampling period in milliseconds
        #[arg(long, default_value_t = 1000)]
        period: u32,
    },
    /// Fetch the journal handoff and persist every record
    Ingest {
        /// Print Prometheus metrics after the run
        #[arg(long)]
        print_metrics: bool,
    },
}

#[derive(Subcommand)]
enum CheckCommand {
    /// Show one check
    Get {
        uuid: String,
        /// Print the daemon's XML instead of decoded JSON
        #[arg(long)]
        raw: bool,
    },
    /// List the UUIDs of all configured checks
    List,
    /// Create or replace a check from an XML file
    Set { uuid: String, file: PathBuf },
    /// Delete a check
    Delete { uuid: String },
    /// Run a check once from an XML file and print the result
    Test { uuid: String, file: PathBuf },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load(&cli.config)?;

    match cli.command {
        Commands::Check { command } => match command {
            CheckCommand::Get { uuid, raw } => commands::check::get(&config, &uuid, raw).await,
            CheckCommand::List => commands::check::list(&config).await,
            CheckCommand::Set { uuid, file } => commands::check::set(&config, &uuid, &file).await,
            CheckCommand::Delete { uuid } => commands::check::delete(&config, &uuid).await,
            CheckCommand::Test { uuid, file } => {
                commands::check::test(&config, &uuid, &file).await
            }
        },
        Commands::Version => commands::check::version(&config).await,
        Commands::Live { uuid, period } => commands::live::execute(&config, uuid, period).await,
        Commands::Ingest { print_metrics } => {
            commands::ingest::execute(&config, print_metrics).await
        }
    }
}

fn load(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", path);
    let config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    debug!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Configuration loaded"
    );
    Ok(config)
}
