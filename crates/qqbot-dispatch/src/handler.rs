//! Handler traits and the context handed to them.

use crate::error::DispatchError;
use crate::registry::RegistryHandle;
use crate::Result;
use async_trait::async_trait;
use qqbot_api::{BotApi, SentMessage};
use qqbot_core::{BotUser, Event, Matcher, MessageEvent, OutboundMessage, ReadyPayload, Scope};
use qqbot_session::{SessionManager, WaitForError, WaitKey};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What a command handler tells the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    /// Let later commands and the fallback handler see the message.
    #[default]
    Continue,
    /// The message is claimed.
    Stop,
}

impl Flow {
    /// Whether the message is claimed.
    pub fn is_stop(self) -> bool {
        self == Self::Stop
    }
}

impl From<bool> for Flow {
    fn from(stop: bool) -> Self {
        if stop {
            Self::Stop
        } else {
            Self::Continue
        }
    }
}

/// Handles a matched command or the fallback message.
///
/// The returned [`Flow`] only matters for commands registered with a
/// custom short-circuit.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: Context, message: MessageEvent) -> anyhow::Result<Flow>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Context, MessageEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Flow>> + Send + 'static,
{
    async fn handle(&self, ctx: Context, message: MessageEvent) -> anyhow::Result<Flow> {
        (self)(ctx, message).await
    }
}

/// Runs before command matching; cannot claim the message.
#[async_trait]
pub trait PreprocessHandler: Send + Sync {
    async fn process(&self, ctx: Context, message: MessageEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> PreprocessHandler for F
where
    F: Fn(Context, MessageEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn process(&self, ctx: Context, message: MessageEvent) -> anyhow::Result<()> {
        (self)(ctx, message).await
    }
}

/// Handles one non-message event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: Context, event: Event) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Context, Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: Context, event: Event) -> anyhow::Result<()> {
        (self)(ctx, event).await
    }
}

/// Called once, on the first READY.
#[async_trait]
pub trait StartHandler: Send + Sync {
    async fn on_start(&self, ctx: Context, ready: ReadyPayload) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> StartHandler for F
where
    F: Fn(Context, ReadyPayload) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_start(&self, ctx: Context, ready: ReadyPayload) -> anyhow::Result<()> {
        (self)(ctx, ready).await
    }
}

/// Everything a handler can reach.
#[derive(Clone)]
pub struct Context {
    api: Arc<dyn BotApi>,
    sessions: Arc<SessionManager>,
    registry: RegistryHandle,
    bot: Option<BotUser>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("bot", &self.bot).finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        api: Arc<dyn BotApi>,
        sessions: Arc<SessionManager>,
        registry: RegistryHandle,
        bot: Option<BotUser>,
    ) -> Self {
        Self {
            api,
            sessions,
            registry,
            bot,
        }
    }

    /// REST client.
    pub fn api(&self) -> &Arc<dyn BotApi> {
        &self.api
    }

    /// Session table.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Queue registry changes; they apply before the next frame.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// The bot account, once READY has been seen.
    pub fn bot(&self) -> Option<&BotUser> {
        self.bot.as_ref()
    }

    /// Send `message` wherever `to` came from, as a passive reply.
    pub async fn send(&self, to: &MessageEvent, mut message: OutboundMessage) -> Result<SentMessage> {
        let target = to
            .reply_target()
            .ok_or_else(|| DispatchError::NoReplyTarget(to.id.clone()))?;
        if message.msg_id.is_none() && !to.id.is_empty() {
            message.msg_id = Some(to.id.clone());
        }
        Ok(self.api.reply(&target, &message).await?)
    }

    /// Reply with plain text.
    pub async fn reply(&self, to: &MessageEvent, content: impl Into<String> + Send) -> Result<SentMessage> {
        self.send(to, OutboundMessage::text(content)).await
    }

    /// Wait for the next message matching `matcher`, pinned to `origin`'s
    /// identity in each of `scopes`. The matching message is not offered to
    /// commands or the fallback handler.
    ///
    /// The dispatcher fills registrations while it reads frames, so this
    /// must not be awaited from a handler the dispatcher itself awaits
    /// (inline execution or a custom short-circuit command); such a wait
    /// can only time out.
    pub async fn wait_for(
        &self,
        origin: &MessageEvent,
        scopes: &[Scope],
        matcher: impl Into<Matcher>,
        timeout: Duration,
    ) -> std::result::Result<MessageEvent, WaitForError> {
        self.wait_for_key(WaitKey::new(matcher).scoped_to(scopes, origin), true, timeout)
            .await
    }

    /// Wait on an explicit key. With `short_circuit` unset the matching
    /// message is also dispatched normally.
    pub async fn wait_for_key(
        &self,
        key: WaitKey,
        short_circuit: bool,
        timeout: Duration,
    ) -> std::result::Result<MessageEvent, WaitForError> {
        self.sessions
            .wait_for()
            .register(key, short_circuit)
            .wait(timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_from_bool() {
        assert_eq!(Flow::from(true), Flow::Stop);
        assert_eq!(Flow::from(false), Flow::Continue);
        assert!(Flow::Stop.is_stop());
        assert!(!Flow::default().is_stop());
    }
}
