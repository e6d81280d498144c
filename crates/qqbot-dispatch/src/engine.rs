//! The dispatch pipeline.

use crate::handler::{Context, Flow};
use crate::registry::{Registry, RegistryHandle, RegistryOp};
use crate::treat::{has_mention, treat_msg};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use qqbot_api::BotApi;
use qqbot_core::config::{DispatchConfig, ExecutionMode, MessageIntent};
use qqbot_core::{BotUser, DispatchFrame, Event, EventType, Intents, MessageEvent, OpCode, ReadyPayload};
use qqbot_session::SessionManager;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

/// Routes decoded frames to registered handlers.
///
/// One engine serves every shard of a bot.
pub struct DispatchEngine {
    registry: RwLock<Arc<Registry>>,
    ops_tx: mpsc::UnboundedSender<RegistryOp>,
    ops_rx: Mutex<mpsc::UnboundedReceiver<RegistryOp>>,
    api: Arc<dyn BotApi>,
    sessions: Arc<SessionManager>,
    bot: RwLock<Option<BotUser>>,
    started: AtomicBool,
    execution: ExecutionMode,
    workers: Arc<Semaphore>,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("registry", &self.registry.read())
            .field("execution", &self.execution)
            .field("bot", &self.bot.read())
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Create an engine over `registry`.
    pub fn new(
        registry: Registry,
        api: Arc<dyn BotApi>,
        sessions: Arc<SessionManager>,
        config: &DispatchConfig,
    ) -> Self {
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        Self {
            registry: RwLock::new(Arc::new(registry)),
            ops_tx,
            ops_rx: Mutex::new(ops_rx),
            api,
            sessions,
            bot: RwLock::new(None),
            started: AtomicBool::new(false),
            execution: config.execution,
            workers: Arc::new(Semaphore::new(config.worker_threads.max(1))),
        }
    }

    /// Handler execution mode.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution
    }

    /// Current registry, with queued changes applied.
    pub fn registry(&self) -> Arc<Registry> {
        self.apply_pending()
    }

    /// Handle for queuing registry changes.
    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle::new(self.ops_tx.clone())
    }

    /// Edit the registry directly.
    pub fn update_registry(&self, f: impl FnOnce(&mut Registry)) {
        self.apply_pending();
        let mut guard = self.registry.write();
        f(Arc::make_mut(&mut guard));
    }

    /// Intents for everything currently registered.
    pub fn intents(&self, message_intent: MessageIntent) -> Intents {
        self.registry().intents(message_intent)
    }

    /// The bot account from the last READY.
    pub fn bot(&self) -> Option<BotUser> {
        self.bot.read().clone()
    }

    /// Set the bot account, e.g. from a `users/@me` lookup before READY.
    pub fn set_bot(&self, bot: BotUser) {
        *self.bot.write() = Some(bot);
    }

    pub fn api(&self) -> &Arc<dyn BotApi> {
        &self.api
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// A handler context.
    pub fn context(&self) -> Context {
        Context::new(
            Arc::clone(&self.api),
            Arc::clone(&self.sessions),
            self.handle(),
            self.bot(),
        )
    }

    fn apply_pending(&self) -> Arc<Registry> {
        let ops: Vec<RegistryOp> = {
            let mut rx = self.ops_rx.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        if !ops.is_empty() {
            debug!("Applying {} queued registry changes", ops.len());
            let mut guard = self.registry.write();
            let registry = Arc::make_mut(&mut guard);
            for op in ops {
                registry.apply(op);
            }
        }

        Arc::clone(&self.registry.read())
    }

    // --- Entry points ---

    /// Dispatch one gateway frame. Non-dispatch frames and undecodable
    /// payloads are dropped.
    pub async fn dispatch(&self, frame: &DispatchFrame) {
        if frame.op_code() != Some(OpCode::Dispatch) {
            debug!("Ignoring op {} frame", frame.op);
            return;
        }
        let Some(event_type) = frame.event_type.as_deref() else {
            debug!("Dropping dispatch frame without a type");
            return;
        };

        let registry = self.apply_pending();
        if event_type == EventType::Ready.as_str() {
            self.on_ready(&registry, frame.payload.clone()).await;
            return;
        }

        match Event::decode(event_type, frame.payload.clone(), frame.id.clone()) {
            Ok(event) => self.route(&registry, event).await,
            Err(e) => debug!("Dropping undecodable {} event: {}", event_type, e),
        }
    }

    /// Dispatch an already decoded event.
    pub async fn dispatch_event(&self, event: Event) {
        let registry = self.apply_pending();
        self.route(&registry, event).await;
    }

    async fn on_ready(&self, registry: &Registry, payload: Value) {
        let ready: ReadyPayload = match serde_json::from_value(payload) {
            Ok(ready) => ready,
            Err(e) => {
                debug!("Dropping undecodable READY: {}", e);
                return;
            }
        };

        info!("Ready as {} ({})", ready.user.username, ready.user.id);
        self.set_bot(ready.user.clone());

        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handler) = registry.start_handler() {
            let ctx = self.context();
            self.run("start handler".to_string(), async move {
                handler.on_start(ctx, ready).await.map(|_| Flow::Continue)
            })
            .await;
        }
    }

    async fn route(&self, registry: &Registry, event: Event) {
        let event = match event {
            Event::Message(message) => return self.dispatch_message(registry, *message).await,
            other => other,
        };

        let handler = event
            .event_type()
            .and_then(|event_type| registry.event_handler(event_type));
        let Some(handler) = handler else {
            debug!("No handler bound for {}", event.name());
            return;
        };

        let ctx = self.context();
        let source = format!("{} handler", event.name());
        self.run(source, async move {
            handler.handle(ctx, event).await.map(|_| Flow::Continue)
        })
        .await;
    }

    async fn dispatch_message(&self, registry: &Registry, mut message: MessageEvent) {
        let bot = self.bot();
        let bot_id = bot.as_ref().map(|b| b.id.as_str()).filter(|id| !id.is_empty());
        let mentioned = bot_id.map_or(false, |id| {
            has_mention(&message.content, id) || message.mentions_user(id)
        });
        message.treated_msg = Some(treat_msg(&message.content, bot_id));

        let ctx = Context::new(
            Arc::clone(&self.api),
            Arc::clone(&self.sessions),
            self.handle(),
            bot.clone(),
        );

        for preprocessor in registry.preprocessors() {
            if !preprocessor.valid_scenes().contains(message.scene) {
                continue;
            }
            let handler = preprocessor.handler();
            let (ctx, arg) = (ctx.clone(), message.clone());
            let source = format!("preprocessor on {}", message.event_type);
            guarded(source, async move {
                handler.process(ctx, arg).await.map(|_| Flow::Continue)
            })
            .await;
        }

        let filled = self.sessions.wait_for().fill(&message);
        if filled.short_circuit {
            debug!("Message {} claimed by a wait-for", message.id);
            return;
        }

        for command in registry.commands() {
            if !command.matches(&message, mentioned) {
                continue;
            }
            let source = format!("command {} on {}", command.matcher(), message.event_type);

            if command.requires_admin() && !message.is_admin() {
                match command.admin_error() {
                    Some(text) => {
                        let (ctx, to, text) = (ctx.clone(), message.clone(), text.to_string());
                        self.run(source, async move {
                            ctx.reply(&to, text).await?;
                            Ok::<_, anyhow::Error>(Flow::Stop)
                        })
                        .await;
                        return;
                    }
                    None => {
                        debug!("Skipping {}: sender is not an admin", source);
                        continue;
                    }
                }
            }

            let mut arg = message.clone();
            if !command.treats() {
                arg.treated_msg = None;
            }
            let (handler, cctx) = (command.handler(), ctx.clone());
            let call = async move { handler.handle(cctx, arg).await };

            let stop = if command.is_custom_short_circuit() {
                self.run_awaited(source, call)
                    .await
                    .map_or(false, Flow::is_stop)
            } else {
                self.run(source, call).await;
                command.is_short_circuit()
            };
            if stop {
                return;
            }
        }

        if let Some(handler) = registry.fallback(message.scene) {
            let source = format!("message handler on {}", message.event_type);
            self.run(source, async move { handler.handle(ctx, message).await })
                .await;
        }
    }

    // --- Execution ---

    /// Run a handler per the execution mode without waiting for a spawned
    /// one to finish.
    async fn run<F>(&self, source: String, call: F)
    where
        F: Future<Output = anyhow::Result<Flow>> + Send + 'static,
    {
        match self.execution {
            ExecutionMode::Inline => {
                guarded(source, call).await;
            }
            ExecutionMode::Spawn => {
                tokio::spawn(guarded(source, call));
            }
            ExecutionMode::Blocking => {
                let workers = Arc::clone(&self.workers);
                tokio::spawn(async move {
                    let _ = on_worker(workers, source, call).await;
                });
            }
        }
    }

    /// Run a handler and wait for its flow.
    async fn run_awaited<F>(&self, source: String, call: F) -> Option<Flow>
    where
        F: Future<Output = anyhow::Result<Flow>> + Send + 'static,
    {
        match self.execution {
            ExecutionMode::Inline | ExecutionMode::Spawn => guarded(source, call).await,
            ExecutionMode::Blocking => on_worker(Arc::clone(&self.workers), source, call).await,
        }
    }
}

/// Run on a blocking thread, bounded by `workers`.
async fn on_worker<F>(workers: Arc<Semaphore>, source: String, call: F) -> Option<Flow>
where
    F: Future<Output = anyhow::Result<Flow>> + Send + 'static,
{
    let _permit = workers.acquire_owned().await.ok()?;
    let runtime = tokio::runtime::Handle::current();
    match tokio::task::spawn_blocking(move || runtime.block_on(guarded(source, call))).await {
        Ok(flow) => flow,
        Err(e) => {
            error!("Handler worker failed: {}", e);
            None
        }
    }
}

/// Await a handler, logging its error or panic.
async fn guarded<F>(source: String, call: F) -> Option<Flow>
where
    F: Future<Output = anyhow::Result<Flow>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(flow)) => Some(flow),
        Ok(Err(e)) => {
            error!(source = %source, "Handler failed: {:#}", e);
            None
        }
        Err(panic) => {
            error!(source = %source, "Handler panicked: {}", panic_message(panic.as_ref()));
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
