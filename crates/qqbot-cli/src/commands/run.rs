//! Run command.

use clap::Args;
use qqbot_core::{BotConfig, MessageEvent, ReadyPayload};
use qqbot_dispatch::{CommandDescriptor, Context, Flow, Registry};
use qqbot_gateway::Bot;
use tracing::info;

/// Run command arguments.
#[derive(Args)]
pub struct RunArgs {
    /// Shard count, overriding the gateway recommendation
    #[arg(long)]
    pub shards: Option<u32>,

    /// Skip loading and committing session snapshots
    #[arg(long)]
    pub no_sessions: bool,
}

/// Handlers the stock binary installs: a `ping` command and a logging fallback.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .command(CommandDescriptor::literal(["ping"], |ctx: Context, message: MessageEvent| async move {
            ctx.reply(&message, "pong").await?;
            anyhow::Ok(Flow::Stop)
        }))
        .on_message(|_ctx: Context, message: MessageEvent| async move {
            info!(
                "[{:?}] {}: {}",
                message.scene,
                message.author.id.as_deref().unwrap_or("?"),
                message.text()
            );
            anyhow::Ok(Flow::Continue)
        })
        .on_start(|_ctx: Context, ready: ReadyPayload| async move {
            info!("Logged in as {} ({})", ready.user.username, ready.user.id);
            anyhow::Ok(())
        });
    registry
}

/// Run the bot until Ctrl+C.
pub async fn run(args: RunArgs, mut config: BotConfig) -> anyhow::Result<()> {
    if let Some(shards) = args.shards {
        config.gateway.shard_total = Some(shards);
    }
    if args.no_sessions {
        config.session.enabled = false;
    }

    info!("Starting bot {}", config.credentials.app_id);
    let bot = Bot::new(config, default_registry())?;
    bot.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qqbot_core::config::MessageIntent;
    use qqbot_core::{Intents, Matcher};

    #[test]
    fn test_default_registry() {
        let registry = default_registry();
        assert_eq!(registry.command_count(), 1);
        let ping = registry.commands().next().unwrap();
        assert_eq!(ping.matcher(), &Matcher::from("ping"));
        assert!(registry.start_handler().is_some());

        let intents = registry.intents(MessageIntent::AtOnly);
        assert!(intents.contains(Intents::PUBLIC_GUILD_MESSAGES));
        assert!(intents.contains(Intents::GROUP_AND_C2C_EVENT));
    }
}
