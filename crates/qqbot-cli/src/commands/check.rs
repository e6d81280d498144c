//! Configuration check command.

use crate::commands::run::default_registry;
use clap::Args;
use console::{style, Emoji};
use qqbot_core::{BotConfig, ConfigError};

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Check command arguments.
#[derive(Args)]
pub struct CheckArgs {
    /// Also print the resolved endpoints and directories
    #[arg(long)]
    pub full: bool,
}

/// Validate the loaded configuration and report what would be subscribed.
pub async fn run(args: CheckArgs, config: Result<BotConfig, ConfigError>) -> anyhow::Result<()> {
    println!("qqbot check\n");

    let config = match config {
        Ok(config) => {
            println!("  {} Configuration loaded", style(CHECK).green());
            config
        }
        Err(ConfigError::NotFound(path)) => {
            println!(
                "  {} Configuration file not found: {}",
                style(WARN).yellow(),
                path.display()
            );
            anyhow::bail!("no configuration");
        }
        Err(e) => {
            println!("  {} Configuration error: {}", style(CROSS).red(), e);
            return Err(e.into());
        }
    };

    let valid = match config.validate() {
        Ok(()) => {
            println!("  {} Configuration valid", style(CHECK).green());
            true
        }
        Err(e) => {
            println!("  {} {}", style(CROSS).red(), e);
            false
        }
    };

    let intents = default_registry().intents(config.dispatch.message_intent);
    println!("\nIntents: {} ({:#x})", intents, intents.bits());
    println!("Execution: {:?}", config.dispatch.execution);

    if args.full {
        println!("API base URL: {}", config.api.resolved_base_url());
        match config.session_commit_dir() {
            Ok(dir) => println!("Session directory: {}", dir.display()),
            Err(e) => println!("Session directory: {} {}", style(WARN).yellow(), e),
        }
    }

    if !valid {
        anyhow::bail!("configuration is invalid");
    }
    Ok(())
}
