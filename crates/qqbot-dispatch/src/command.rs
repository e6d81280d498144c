//! Command descriptors and preprocessors.

use crate::handler::{MessageHandler, PreprocessHandler};
use crate::Result;
use qqbot_core::{Matcher, MessageEvent, Scenes};
use std::fmt;
use std::sync::Arc;

/// A registered command: a matcher, the rules around it, and its handler.
#[derive(Clone)]
pub struct CommandDescriptor {
    matcher: Matcher,
    scenes: Scenes,
    require_at: bool,
    require_admin: bool,
    short_circuit: bool,
    custom_short_circuit: bool,
    admin_error_msg: Option<String>,
    treat: bool,
    handler: Arc<dyn MessageHandler>,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("matcher", &self.matcher)
            .field("scenes", &self.scenes)
            .field("require_at", &self.require_at)
            .field("require_admin", &self.require_admin)
            .field("short_circuit", &self.short_circuit)
            .field("custom_short_circuit", &self.custom_short_circuit)
            .field("treat", &self.treat)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    /// Command valid in every scene, short-circuiting, with treatment on.
    pub fn new(matcher: impl Into<Matcher>, handler: impl MessageHandler + 'static) -> Self {
        Self {
            matcher: matcher.into(),
            scenes: Scenes::ALL,
            require_at: false,
            require_admin: false,
            short_circuit: true,
            custom_short_circuit: false,
            admin_error_msg: None,
            treat: true,
            handler: Arc::new(handler),
        }
    }

    /// Command matching any of `commands` as substrings.
    pub fn literal<I, S>(commands: I, handler: impl MessageHandler + 'static) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Matcher::literal(commands), handler)
    }

    /// Command matching a regex search.
    pub fn regex(pattern: &str, handler: impl MessageHandler + 'static) -> Result<Self> {
        Ok(Self::new(Matcher::regex(pattern)?, handler))
    }

    /// Restrict to `scenes`.
    pub fn scenes(mut self, scenes: impl Into<Scenes>) -> Self {
        self.scenes = scenes.into();
        self
    }

    /// Only match when the bot is mentioned.
    pub fn require_at(mut self, on: bool) -> Self {
        self.require_at = on;
        self
    }

    /// Only run for members holding an administrator role.
    pub fn require_admin(mut self, on: bool) -> Self {
        self.require_admin = on;
        self
    }

    /// Whether a match stops further commands and the fallback handler.
    pub fn short_circuit(mut self, on: bool) -> Self {
        self.short_circuit = on;
        self
    }

    /// Await the handler and let its [`Flow`](crate::Flow) decide.
    pub fn custom_short_circuit(mut self, on: bool) -> Self {
        self.custom_short_circuit = on;
        self
    }

    /// Reply sent (and the message claimed) when the admin check fails.
    pub fn admin_error_msg(mut self, msg: impl Into<String>) -> Self {
        self.admin_error_msg = Some(msg.into());
        self
    }

    /// Hand the handler the treated message text.
    pub fn treat(mut self, on: bool) -> Self {
        self.treat = on;
        self
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn valid_scenes(&self) -> Scenes {
        self.scenes
    }

    pub fn is_literal(&self) -> bool {
        self.matcher.is_literal()
    }

    pub fn requires_at(&self) -> bool {
        self.require_at
    }

    pub fn requires_admin(&self) -> bool {
        self.require_admin
    }

    pub fn is_short_circuit(&self) -> bool {
        self.short_circuit
    }

    pub fn is_custom_short_circuit(&self) -> bool {
        self.custom_short_circuit
    }

    pub fn admin_error(&self) -> Option<&str> {
        self.admin_error_msg.as_deref()
    }

    pub fn treats(&self) -> bool {
        self.treat
    }

    pub(crate) fn handler(&self) -> Arc<dyn MessageHandler> {
        Arc::clone(&self.handler)
    }

    /// Scene and pattern check against the raw content. `mentioned` says
    /// whether the bot mention is present.
    pub fn matches(&self, message: &MessageEvent, mentioned: bool) -> bool {
        self.scenes.contains(message.scene)
            && (!self.require_at || mentioned)
            && self.matcher.matches(&message.content)
    }
}

/// A hook run on every message in its scenes before command matching.
#[derive(Clone)]
pub struct Preprocessor {
    scenes: Scenes,
    handler: Arc<dyn PreprocessHandler>,
}

impl fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preprocessor")
            .field("scenes", &self.scenes)
            .finish_non_exhaustive()
    }
}

impl Preprocessor {
    pub fn new(scenes: impl Into<Scenes>, handler: impl PreprocessHandler + 'static) -> Self {
        Self {
            scenes: scenes.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn valid_scenes(&self) -> Scenes {
        self.scenes
    }

    pub(crate) fn handler(&self) -> Arc<dyn PreprocessHandler> {
        Arc::clone(&self.handler)
    }
}
