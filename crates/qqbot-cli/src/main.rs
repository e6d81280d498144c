//! qqbot CLI entry point.

use clap::Parser;
use qqbot_cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Run the command
    run(cli).await
}
