//! qqbot command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use qqbot_core::config::LoggingConfig;
use qqbot_core::{BotConfig, ConfigError};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// qqbot - QQ bot gateway runtime
#[derive(Parser)]
#[command(name = "qqbot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Path to config file
    #[arg(short, long, env = "QQBOT_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the gateway and serve events
    Run(commands::run::RunArgs),

    /// Validate the configuration
    Check(commands::check::CheckArgs),

    /// Inspect a persisted session snapshot
    Sessions(commands::sessions::SessionsArgs),

    /// Show version information
    Version,
}

/// Load the config file named on the command line, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<BotConfig, ConfigError> {
    match path {
        Some(path) => BotConfig::load(path),
        None => BotConfig::load_default(),
    }
}

/// Build the log filter: `RUST_LOG` wins, then `-v`, then the config level.
pub fn log_filter(logging: &LoggingConfig, verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::new(format!("qqbot={}", level))
}

fn init_logging(logging: &LoggingConfig, verbose: u8, json: bool) {
    let filter = log_filter(logging, verbose);
    let registry = tracing_subscriber::registry().with(filter);
    // Ignore double init from tests
    if json || logging.json {
        let _ = registry.with(tracing_subscriber::fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(tracing_subscriber::fmt::layer()).try_init();
    }
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref());
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_logging(&logging, cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Run(args) => commands::run::run(args, config?).await,
        Commands::Check(args) => commands::check::run(args, config).await,
        Commands::Sessions(args) => commands::sessions::run(args, config.ok()).await,
        Commands::Version => {
            println!("qqbot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
