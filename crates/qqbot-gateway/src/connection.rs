//! One shard's gateway socket.

use crate::dedup::SequenceDedupCache;
use crate::heartbeat::{spawn_heartbeat, spawn_writer};
use crate::state::{ConnectionState, GatewaySession};
use crate::transport::Transport;
use crate::Result;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use qqbot_api::BotApi;
use qqbot_core::config::GatewayConfig;
use qqbot_core::{DispatchFrame, EventType, HelloPayload, Intents, OpCode, ReadyPayload, SecretString};
use qqbot_dispatch::DispatchEngine;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Close code sent when the requested intents are not granted.
const CLOSE_DISALLOWED_INTENTS: u16 = 4014;

/// Why a socket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Server closed or the stream errored.
    Closed,
    /// Idle watchdog fired.
    IdleTimeout,
    /// Op 9 received.
    InvalidSession,
    /// `close()` or `force_reset()`.
    Dropped,
    /// `stop()`.
    Stopped,
}

/// A reconnecting gateway client for one shard.
///
/// Dispatch frames are handed to the engine inline, in arrival order, after
/// de-duplication by sequence number.
pub struct GatewayConnection {
    shard: [u32; 2],
    intents: Intents,
    config: GatewayConfig,
    no_permission_warning: bool,
    api: Arc<dyn BotApi>,
    engine: Arc<DispatchEngine>,
    session: Arc<Mutex<GatewaySession>>,
    dedup: Mutex<SequenceDedupCache>,
    state: RwLock<ConnectionState>,
    running: AtomicBool,
    shutdown: CancellationToken,
    socket: Mutex<Option<CancellationToken>>,
}

impl GatewayConnection {
    pub fn new(
        shard: [u32; 2],
        intents: Intents,
        config: GatewayConfig,
        api: Arc<dyn BotApi>,
        engine: Arc<DispatchEngine>,
    ) -> Self {
        Self {
            shard,
            intents,
            dedup: Mutex::new(SequenceDedupCache::new(config.dedup_capacity)),
            config,
            no_permission_warning: true,
            api,
            engine,
            session: Arc::new(Mutex::new(GatewaySession::new(shard))),
            state: RwLock::new(ConnectionState::Disconnected),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            socket: Mutex::new(None),
        }
    }

    /// Log a hint when the server refuses the requested intents.
    pub fn with_permission_warning(mut self, enabled: bool) -> Self {
        self.no_permission_warning = enabled;
        self
    }

    pub fn shard(&self) -> [u32; 2] {
        self.shard
    }

    pub fn intents(&self) -> Intents {
        self.intents
    }

    /// Snapshot of the resumable session.
    pub fn session(&self) -> GatewaySession {
        self.session.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write();
        if *current != state {
            debug!("Shard {} {} -> {}", self.shard[0], *current, state);
            *current = state;
        }
    }

    // --- Connect loop ---

    /// Connect, and keep reconnecting until stopped or a fatal error.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Starting gateway shard {}/{}", self.shard[0], self.shard[1]);

        let result = loop {
            if self.shutdown.is_cancelled() {
                break Ok(());
            }

            let exit = match self.connect_once().await {
                Ok(exit) => exit,
                Err(e) if e.is_fatal() => {
                    error!("Shard {} cannot continue: {}", self.shard[0], e);
                    break Err(e);
                }
                Err(e) => {
                    warn!("Shard {} connection failed: {}", self.shard[0], e);
                    Exit::Closed
                }
            };

            let delay = match exit {
                Exit::Stopped => break Ok(()),
                Exit::InvalidSession => self.invalid_session_delay(),
                _ => self.session.lock().on_close(&self.config),
            };
            if self.shutdown.is_cancelled() {
                break Ok(());
            }

            self.set_state(ConnectionState::ReconnectPending);
            let attempt = self.session.lock().reconnect_count;
            info!(
                "Shard {} reconnecting in {:?} (attempt {})",
                self.shard[0], delay, attempt
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.session.lock().reset();
        self.dedup.lock().clear();
        self.set_state(ConnectionState::Closed);
        info!("Gateway shard {} stopped", self.shard[0]);
        result
    }

    fn invalid_session_delay(&self) -> Duration {
        let min = self.config.invalid_session_delay_min_ms;
        let max = self.config.invalid_session_delay_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// One socket lifetime, from discovery to close.
    async fn connect_once(&self) -> Result<Exit> {
        self.set_state(ConnectionState::Connecting);

        let token = self.api.authorization().await?;
        let gateway = self.api.gateway().await?;
        self.session.lock().token = Some(SecretString::new(token));

        debug!("Shard {} connecting to {}", self.shard[0], gateway.url);
        let (ws, _) = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Exit::Stopped),
            connected = tokio_tungstenite::connect_async(gateway.url.as_str()) => connected?,
        };
        self.set_state(ConnectionState::AwaitingHello);

        let socket_token = self.shutdown.child_token();
        *self.socket.lock() = Some(socket_token.clone());

        let (sink, mut stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = spawn_writer(sink, outbound_rx, socket_token.clone());
        let mut heartbeat: Option<JoinHandle<()>> = None;
        let idle = self.config.idle_timeout();

        let exit = loop {
            let next = tokio::select! {
                _ = socket_token.cancelled() => {
                    break if self.shutdown.is_cancelled() { Exit::Stopped } else { Exit::Dropped };
                }
                next = tokio::time::timeout(idle, stream.next()) => next,
            };

            let message = match next {
                Err(_) => {
                    warn!(
                        "Shard {} received nothing for {:?}, forcing reconnect",
                        self.shard[0], idle
                    );
                    self.session.lock().on_idle_timeout();
                    break Exit::IdleTimeout;
                }
                Ok(None) => {
                    info!("Shard {} stream ended", self.shard[0]);
                    break Exit::Closed;
                }
                Ok(Some(Err(e))) => {
                    warn!("Shard {} read failed: {}", self.shard[0], e);
                    break Exit::Closed;
                }
                Ok(Some(Ok(message))) => message,
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    self.log_close(frame.as_ref());
                    break Exit::Closed;
                }
                // Ping, pong and binary frames
                _ => continue,
            };

            let frame = match DispatchFrame::decode(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Shard {} dropping malformed frame: {}", self.shard[0], e);
                    continue;
                }
            };

            if let Some(exit) = self
                .handle_frame(frame, &outbound, &mut heartbeat, &socket_token)
                .await
            {
                break exit;
            }
        };

        self.set_state(ConnectionState::Closing);
        socket_token.cancel();
        drop(outbound);
        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        let _ = tokio::time::timeout(Duration::from_secs(2), writer).await;
        self.socket.lock().take();
        self.set_state(ConnectionState::Disconnected);
        Ok(exit)
    }

    fn log_close(&self, frame: Option<&CloseFrame<'_>>) {
        let Some(frame) = frame else {
            info!("Shard {} closed by server", self.shard[0]);
            return;
        };
        let code = u16::from(frame.code);
        if code == CLOSE_DISALLOWED_INTENTS && self.no_permission_warning {
            warn!(
                "Shard {} closed ({}): intents {} are not granted to this bot",
                self.shard[0], code, self.intents
            );
        } else {
            info!(
                "Shard {} closed by server ({}): {}",
                self.shard[0], code, frame.reason
            );
        }
    }

    // --- Frame handling ---

    /// Returns `Some` when the socket must end.
    async fn handle_frame(
        &self,
        frame: DispatchFrame,
        outbound: &mpsc::UnboundedSender<DispatchFrame>,
        heartbeat: &mut Option<JoinHandle<()>>,
        socket_token: &CancellationToken,
    ) -> Option<Exit> {
        match frame.op_code() {
            Some(OpCode::Hello) => {
                let hello: HelloPayload = match serde_json::from_value(frame.payload) {
                    Ok(hello) => hello,
                    Err(e) => {
                        warn!("Shard {} bad HELLO payload: {}", self.shard[0], e);
                        return None;
                    }
                };
                if hello.heartbeat_interval == 0 {
                    warn!("Shard {} ignoring HELLO with zero heartbeat interval", self.shard[0]);
                    return None;
                }
                let interval = Duration::from_millis(hello.heartbeat_interval);
                self.session.lock().heartbeat_interval = Some(interval);
                if heartbeat.is_none() {
                    *heartbeat = Some(spawn_heartbeat(
                        interval,
                        self.session.clone(),
                        outbound.clone(),
                        socket_token.child_token(),
                    ));
                }

                let (handshake, resuming) = self.handshake();
                if resuming {
                    info!("Shard {} resuming session", self.shard[0]);
                    self.set_state(ConnectionState::Resuming);
                } else {
                    info!(
                        "Shard {} identifying with intents {}",
                        self.shard[0], self.intents
                    );
                    self.set_state(ConnectionState::Identifying);
                }
                if outbound.send(handshake).is_err() {
                    return Some(Exit::Closed);
                }
            }
            Some(OpCode::Dispatch) => self.handle_dispatch(frame).await,
            Some(OpCode::HeartbeatAck) => debug!("Shard {} heartbeat acknowledged", self.shard[0]),
            Some(OpCode::Heartbeat) => {
                let seq = self.session.lock().last_seq;
                let _ = outbound.send(DispatchFrame::heartbeat(seq));
            }
            Some(OpCode::Reconnect) => {
                info!("Shard {} server requested a reconnect", self.shard[0]);
            }
            Some(OpCode::InvalidSession) => {
                warn!("Shard {} session invalidated by server", self.shard[0]);
                self.session.lock().on_invalid_session();
                return Some(Exit::InvalidSession);
            }
            Some(op) => debug!("Shard {} ignoring client op {:?}", self.shard[0], op),
            None => debug!("Shard {} ignoring unknown op {}", self.shard[0], frame.op),
        }
        None
    }

    /// IDENTIFY, or RESUME when the session allows it.
    fn handshake(&self) -> (DispatchFrame, bool) {
        let session = self.session.lock();
        let token = session
            .token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_default();
        match (&session.session_id, session.can_resume()) {
            (Some(session_id), true) => (
                DispatchFrame::resume(&token, session_id, session.last_seq),
                true,
            ),
            _ => (
                DispatchFrame::identify(&token, self.intents.bits(), self.shard),
                false,
            ),
        }
    }

    async fn handle_dispatch(&self, frame: DispatchFrame) {
        if let Some(seq) = frame.seq {
            self.session.lock().observe_seq(seq);
        }

        match frame.event_type.as_deref() {
            Some(t) if t == EventType::Ready.as_str() => {
                match serde_json::from_value::<ReadyPayload>(frame.payload.clone()) {
                    Ok(ready) => {
                        info!(
                            "Shard {} ready as {} (session {})",
                            self.shard[0], ready.user.username, ready.session_id
                        );
                        self.session.lock().on_ready(ready.session_id);
                        self.dedup.lock().clear();
                        self.set_state(ConnectionState::Active);
                    }
                    Err(e) => warn!("Shard {} bad READY payload: {}", self.shard[0], e),
                }
            }
            Some(t) if t == EventType::Resumed.as_str() => {
                info!("Shard {} resumed", self.shard[0]);
                self.session.lock().on_resumed();
                self.set_state(ConnectionState::Active);
            }
            _ => {
                if let Some(seq) = frame.seq {
                    if !self.dedup.lock().insert(seq) {
                        debug!("Shard {} dropping duplicate seq {}", self.shard[0], seq);
                        return;
                    }
                }
            }
        }

        self.engine.dispatch(&frame).await;
    }
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("shard", &self.shard)
            .field("intents", &self.intents)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl Transport for GatewayConnection {
    fn start(self: Arc<Self>) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    fn close(&self) {
        if let Some(socket) = self.socket.lock().as_ref() {
            socket.cancel();
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        let mut state = self.state.write();
        if *state == ConnectionState::Disconnected {
            *state = ConnectionState::Closed;
        }
    }

    fn force_reset(&self) {
        self.session.lock().reset();
        self.dedup.lock().clear();
        self.close();
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}
