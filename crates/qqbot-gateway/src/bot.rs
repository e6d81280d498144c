//! Bot runner: REST client, session table, dispatch engine and shards.

use crate::connection::GatewayConnection;
use crate::transport::Transport;
use crate::{GatewayError, Result};
use qqbot_api::{BotApi, BotInfo, HttpApi};
use qqbot_core::{BotConfig, BotUser};
use qqbot_dispatch::{DispatchEngine, Registry};
use qqbot_session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A configured bot, ready to connect.
pub struct Bot {
    config: BotConfig,
    api: Arc<dyn BotApi>,
    registry: Registry,
    shutdown: CancellationToken,
}

impl Bot {
    /// Validate credentials and build the HTTP client.
    ///
    /// Missing credentials are fatal; nothing is started.
    pub fn new(config: BotConfig, registry: Registry) -> Result<Self> {
        config.validate_credentials()?;
        let api = HttpApi::from_config(&config)?;
        Ok(Self::with_api(config, registry, Arc::new(api)))
    }

    /// Use an existing REST client.
    pub fn with_api(config: BotConfig, registry: Registry, api: Arc<dyn BotApi>) -> Self {
        Self {
            config,
            api,
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Cancelling this token stops every shard.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until Ctrl+C or a fatal error.
    pub async fn run(self) -> Result<()> {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                token.cancel();
            }
        });
        self.run_until_stopped().await
    }

    /// Run until the shutdown token is cancelled or a fatal error.
    pub async fn run_until_stopped(self) -> Result<()> {
        let info = match self.api.bot_info().await {
            Ok(info) => info,
            Err(e) if e.is_fatal() => return Err(GatewayError::Api(e)),
            Err(e) => {
                warn!("Could not fetch bot identity: {}", e);
                BotInfo::default()
            }
        };
        let bot_id = if info.id.is_empty() {
            self.config.credentials.app_id.clone()
        } else {
            info.id.clone()
        };

        let commit_dir = self.config.session_commit_dir()?;
        let sessions = Arc::new(
            SessionManager::new(bot_id.clone())
                .with_config(&self.config.session, &commit_dir)
                .with_api(self.api.clone()),
        );
        if self.config.session.enabled {
            sessions.load().await;
            sessions.start();
        }

        let engine = Arc::new(DispatchEngine::new(
            self.registry,
            self.api.clone(),
            sessions.clone(),
            &self.config.dispatch,
        ));
        if !info.id.is_empty() {
            engine.set_bot(BotUser {
                id: info.id,
                username: info.username,
                bot: true,
            });
        }

        let intents = engine.intents(self.config.dispatch.message_intent);
        if intents.is_empty() {
            warn!("No handlers registered; subscribing to no events");
        }

        let total = match self.config.gateway.shard_total {
            Some(total) => total,
            None => self.api.gateway().await?.shards,
        }
        .max(1);
        info!("Starting {} shard(s) with intents {}", total, intents);

        let stagger = Duration::from_millis(self.config.gateway.shard_start_interval_ms);
        let mut shards = Vec::with_capacity(total as usize);
        let mut tasks = JoinSet::new();
        for index in 0..total {
            if index > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(stagger) => {}
                }
            }
            let shard = Arc::new(
                GatewayConnection::new(
                    [index, total],
                    intents,
                    self.config.gateway.clone(),
                    self.api.clone(),
                    engine.clone(),
                )
                .with_permission_warning(self.config.dispatch.no_permission_warning),
            );
            tasks.spawn(shard.clone().run());
            shards.push(shard);
        }

        let mut result = Ok(());
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Err(e))) => {
                        result = Err(e);
                        break;
                    }
                    Some(Ok(Ok(()))) => {}
                    Some(Err(e)) => warn!("Shard task ended abnormally: {}", e),
                },
            }
        }

        for shard in &shards {
            shard.stop();
        }
        while tasks.join_next().await.is_some() {}
        sessions.stop().await;
        info!("Bot {} stopped", bot_id);
        result
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("app_id", &self.config.credentials.app_id)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_missing_credentials() {
        let err = Bot::new(BotConfig::default(), Registry::new()).unwrap_err();
        assert!(err.is_fatal());
    }
}
