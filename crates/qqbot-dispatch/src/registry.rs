//! Ordered handler tables.

use crate::command::{CommandDescriptor, Preprocessor};
use crate::error::DispatchError;
use crate::handler::{EventHandler, MessageHandler, PreprocessHandler, StartHandler};
use crate::Result;
use qqbot_core::config::MessageIntent;
use qqbot_core::{EventType, Intents, Matcher, Scene, Scenes};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Fallback message handler and the scenes it covers.
#[derive(Clone)]
pub(crate) struct Fallback {
    pub(crate) scenes: Scenes,
    pub(crate) handler: Arc<dyn MessageHandler>,
}

/// Every registered handler.
///
/// Commands keep registration order; matching walks literal commands first,
/// then regex ones.
#[derive(Clone, Default)]
pub struct Registry {
    commands: Vec<CommandDescriptor>,
    preprocessors: Vec<Preprocessor>,
    events: HashMap<EventType, Arc<dyn EventHandler>>,
    fallback: Option<Fallback>,
    start: Option<Arc<dyn StartHandler>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.events.keys().map(|t| t.as_str()).collect();
        events.sort_unstable();
        f.debug_struct("Registry")
            .field("commands", &self.commands)
            .field("preprocessors", &self.preprocessors.len())
            .field("events", &events)
            .field("fallback", &self.fallback.is_some())
            .field("start", &self.start.is_some())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Registration ---

    /// Add a command.
    pub fn command(&mut self, command: CommandDescriptor) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Add a preprocessor for `scenes`.
    pub fn preprocessor(
        &mut self,
        scenes: impl Into<Scenes>,
        handler: impl PreprocessHandler + 'static,
    ) -> &mut Self {
        self.preprocessors.push(Preprocessor::new(scenes, handler));
        self
    }

    /// Bind the fallback handler for messages in every scene.
    pub fn on_message(&mut self, handler: impl MessageHandler + 'static) -> &mut Self {
        self.on_message_in(Scenes::ALL, handler)
    }

    /// Bind the fallback handler for messages in `scenes`.
    pub fn on_message_in(
        &mut self,
        scenes: impl Into<Scenes>,
        handler: impl MessageHandler + 'static,
    ) -> &mut Self {
        self.fallback = Some(Fallback {
            scenes: scenes.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Bind the handler for a non-message event type, replacing any other.
    pub fn on_event(&mut self, event_type: EventType, handler: impl EventHandler + 'static) -> &mut Self {
        self.events.insert(event_type, Arc::new(handler));
        self
    }

    /// Bind the handler run once on the first READY.
    pub fn on_start(&mut self, handler: impl StartHandler + 'static) -> &mut Self {
        self.start = Some(Arc::new(handler));
        self
    }

    /// Remove every command whose matcher equals `matcher`.
    pub fn remove_command(&mut self, matcher: &Matcher) -> usize {
        let before = self.commands.len();
        self.commands.retain(|c| c.matcher() != matcher);
        before - self.commands.len()
    }

    /// Append `other`'s commands and preprocessors after ours. Its event,
    /// fallback and start handlers only fill slots we leave empty.
    pub fn merge(&mut self, other: Registry) -> &mut Self {
        self.commands.extend(other.commands);
        self.preprocessors.extend(other.preprocessors);
        for (event_type, handler) in other.events {
            self.events.entry(event_type).or_insert(handler);
        }
        if self.fallback.is_none() {
            self.fallback = other.fallback;
        }
        if self.start.is_none() {
            self.start = other.start;
        }
        self
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn apply(&mut self, op: RegistryOp) {
        match op {
            RegistryOp::Command(command) => {
                self.commands.push(command);
            }
            RegistryOp::Preprocessor(preprocessor) => self.preprocessors.push(preprocessor),
            RegistryOp::Event(event_type, handler) => {
                self.events.insert(event_type, handler);
            }
            RegistryOp::Fallback(fallback) => self.fallback = Some(fallback),
            RegistryOp::RemoveCommand(matcher) => {
                self.remove_command(&matcher);
            }
            RegistryOp::Merge(other) => {
                self.merge(*other);
            }
            RegistryOp::Clear => self.clear(),
        }
    }

    // --- Lookup ---

    /// Commands in matching order: literal before regex, each in
    /// registration order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandDescriptor> {
        let literal = self.commands.iter().filter(|c| c.is_literal());
        let regex = self.commands.iter().filter(|c| !c.is_literal());
        literal.chain(regex)
    }

    /// Preprocessors in registration order.
    pub fn preprocessors(&self) -> &[Preprocessor] {
        &self.preprocessors
    }

    /// Handler bound to `event_type`.
    pub fn event_handler(&self, event_type: EventType) -> Option<Arc<dyn EventHandler>> {
        self.events.get(&event_type).cloned()
    }

    /// Fallback handler, if it covers `scene`.
    pub fn fallback(&self, scene: Scene) -> Option<Arc<dyn MessageHandler>> {
        self.fallback
            .as_ref()
            .filter(|f| f.scenes.contains(scene))
            .map(|f| Arc::clone(&f.handler))
    }

    /// Start handler.
    pub fn start_handler(&self) -> Option<Arc<dyn StartHandler>> {
        self.start.clone()
    }

    /// Number of commands.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
            && self.preprocessors.is_empty()
            && self.events.is_empty()
            && self.fallback.is_none()
            && self.start.is_none()
    }

    /// Intents needed to receive everything registered.
    ///
    /// Guild messages use the bit chosen by `message_intent`; DMs, groups and
    /// C2C chats their own bits; event handlers their event's bit.
    pub fn intents(&self, message_intent: MessageIntent) -> Intents {
        let mut scenes = Scenes::empty();
        for command in &self.commands {
            scenes = scenes | command.valid_scenes();
        }
        for preprocessor in &self.preprocessors {
            scenes = scenes | preprocessor.valid_scenes();
        }
        if let Some(fallback) = &self.fallback {
            scenes = scenes | fallback.scenes;
        }

        let mut intents = Intents::empty();
        for scene in scenes.iter() {
            intents |= match scene {
                Scene::Guild => match message_intent {
                    MessageIntent::All => Intents::GUILD_MESSAGES,
                    MessageIntent::AtOnly => Intents::PUBLIC_GUILD_MESSAGES,
                },
                Scene::Dm => Intents::DIRECT_MESSAGE,
                Scene::Group | Scene::C2c => Intents::GROUP_AND_C2C_EVENT,
            };
        }
        for event_type in self.events.keys() {
            intents |= event_type.intent();
        }
        intents
    }
}

/// A queued registry change.
pub(crate) enum RegistryOp {
    Command(CommandDescriptor),
    Preprocessor(Preprocessor),
    Event(EventType, Arc<dyn EventHandler>),
    Fallback(Fallback),
    RemoveCommand(Matcher),
    Merge(Box<Registry>),
    Clear,
}

/// Queues registry changes from handler code. The engine applies them
/// before dispatching the next frame.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryOp>,
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl RegistryHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RegistryOp>) -> Self {
        Self { tx }
    }

    fn send(&self, op: RegistryOp) -> Result<()> {
        self.tx.send(op).map_err(|_| DispatchError::RegistryClosed)
    }

    pub fn command(&self, command: CommandDescriptor) -> Result<()> {
        self.send(RegistryOp::Command(command))
    }

    pub fn preprocessor(
        &self,
        scenes: impl Into<Scenes>,
        handler: impl PreprocessHandler + 'static,
    ) -> Result<()> {
        self.send(RegistryOp::Preprocessor(Preprocessor::new(scenes, handler)))
    }

    pub fn on_event(&self, event_type: EventType, handler: impl EventHandler + 'static) -> Result<()> {
        self.send(RegistryOp::Event(event_type, Arc::new(handler)))
    }

    pub fn on_message_in(
        &self,
        scenes: impl Into<Scenes>,
        handler: impl MessageHandler + 'static,
    ) -> Result<()> {
        self.send(RegistryOp::Fallback(Fallback {
            scenes: scenes.into(),
            handler: Arc::new(handler),
        }))
    }

    pub fn remove_command(&self, matcher: impl Into<Matcher>) -> Result<()> {
        self.send(RegistryOp::RemoveCommand(matcher.into()))
    }

    pub fn merge(&self, registry: Registry) -> Result<()> {
        self.send(RegistryOp::Merge(Box::new(registry)))
    }

    pub fn clear(&self) -> Result<()> {
        self.send(RegistryOp::Clear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Context, Flow};
    use qqbot_core::{Event, MessageEvent};

    async fn noop(_ctx: Context, _message: MessageEvent) -> anyhow::Result<Flow> {
        Ok(Flow::Continue)
    }

    async fn on_guild(_ctx: Context, _event: Event) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_literal_before_regex() {
        let mut registry = Registry::new();
        registry
            .command(CommandDescriptor::regex("^r1", noop).unwrap())
            .command(CommandDescriptor::literal(["l1"], noop))
            .command(CommandDescriptor::regex("^r2", noop).unwrap())
            .command(CommandDescriptor::literal(["l2"], noop));

        let order: Vec<String> = registry.commands().map(|c| c.matcher().to_string()).collect();
        assert_eq!(
            order,
            vec![
                "literal[\"l1\"]".to_string(),
                "literal[\"l2\"]".to_string(),
                "regex(^r1)".to_string(),
                "regex(^r2)".to_string(),
            ]
        );
    }

    #[test]
    fn test_intents_from_registrations() {
        let mut registry = Registry::new();
        assert!(registry.intents(MessageIntent::AtOnly).is_empty());

        registry
            .command(CommandDescriptor::literal(["a"], noop).scenes(Scene::Guild))
            .on_message_in(Scene::Group, noop)
            .on_event(EventType::GuildCreate, on_guild);

        let intents = registry.intents(MessageIntent::AtOnly);
        assert!(intents.contains(Intents::PUBLIC_GUILD_MESSAGES));
        assert!(!intents.contains(Intents::GUILD_MESSAGES));
        assert!(intents.contains(Intents::GROUP_AND_C2C_EVENT));
        assert!(intents.contains(Intents::GUILDS));
        assert!(!intents.contains(Intents::DIRECT_MESSAGE));

        let all = registry.intents(MessageIntent::All);
        assert!(all.contains(Intents::GUILD_MESSAGES));
    }

    #[test]
    fn test_merge_and_clear() {
        let mut base = Registry::new();
        base.command(CommandDescriptor::literal(["base"], noop));

        let mut plugin = Registry::new();
        plugin
            .command(CommandDescriptor::literal(["plugin"], noop))
            .preprocessor(Scenes::ALL, |_ctx: Context, _m: MessageEvent| async { anyhow::Ok(()) })
            .on_message(noop);

        base.merge(plugin);
        let order: Vec<String> = base.commands().map(|c| c.matcher().to_string()).collect();
        assert_eq!(order, vec![Matcher::from("base").to_string(), Matcher::from("plugin").to_string()]);
        assert_eq!(base.preprocessors().len(), 1);
        assert!(base.fallback(Scene::Dm).is_some());

        assert_eq!(base.remove_command(&Matcher::from("base")), 1);
        assert_eq!(base.command_count(), 1);

        base.clear();
        assert!(base.is_empty());
    }

    #[test]
    fn test_handle_queues_ops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = RegistryHandle::new(tx);
        handle.command(CommandDescriptor::literal(["late"], noop)).unwrap();
        handle.clear().unwrap();

        let mut registry = Registry::new();
        registry.apply(rx.try_recv().unwrap());
        assert_eq!(registry.command_count(), 1);
        registry.apply(rx.try_recv().unwrap());
        assert!(registry.is_empty());

        drop(rx);
        assert!(matches!(handle.clear(), Err(DispatchError::RegistryClosed)));
    }
}
