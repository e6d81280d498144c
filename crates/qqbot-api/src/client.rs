//! The REST collaborator contract.

use crate::Result;
use async_trait::async_trait;
use qqbot_core::{OutboundMessage, ReplyTarget};
use serde::{Deserialize, Serialize};

/// The bot's own account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub union_openid: Option<String>,
}

/// Gateway session start budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub remaining: u32,
    #[serde(default)]
    pub reset_after: u64,
    #[serde(default)]
    pub max_concurrency: u32,
}

/// Result of gateway discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayInfo {
    /// WebSocket URL.
    pub url: String,

    /// Recommended shard count.
    #[serde(default = "default_shards")]
    pub shards: u32,

    #[serde(default)]
    pub session_start_limit: Option<SessionStartLimit>,
}

fn default_shards() -> u32 {
    1
}

/// Response of a send call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// REST operations the runtime consumes.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// `Authorization` value; also the IDENTIFY/RESUME token.
    async fn authorization(&self) -> Result<String>;

    /// The bot's own account.
    async fn bot_info(&self) -> Result<BotInfo>;

    /// Gateway URL and recommended shards.
    async fn gateway(&self) -> Result<GatewayInfo>;

    /// Send to a guild channel.
    async fn send_message(&self, channel_id: &str, message: &OutboundMessage) -> Result<SentMessage>;

    /// Send to a DM session.
    async fn send_direct_message(
        &self,
        guild_id: &str,
        message: &OutboundMessage,
    ) -> Result<SentMessage>;

    /// Send to a group.
    async fn send_group_message(
        &self,
        group_openid: &str,
        message: &OutboundMessage,
    ) -> Result<SentMessage>;

    /// Send to a C2C chat.
    async fn send_c2c_message(&self, openid: &str, message: &OutboundMessage) -> Result<SentMessage>;

    /// Route a message to whichever send call matches `target`.
    async fn reply(&self, target: &ReplyTarget, message: &OutboundMessage) -> Result<SentMessage> {
        match target {
            ReplyTarget::Channel { channel_id } => self.send_message(channel_id, message).await,
            ReplyTarget::Direct { guild_id } => self.send_direct_message(guild_id, message).await,
            ReplyTarget::Group { group_openid } => {
                self.send_group_message(group_openid, message).await
            }
            ReplyTarget::C2c { openid } => self.send_c2c_message(openid, message).await,
        }
    }
}
