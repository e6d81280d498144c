//! Per-shard connection state and the reconnect policy.

use qqbot_core::config::GatewayConfig;
use qqbot_core::SecretString;
use std::fmt;
use std::time::Duration;

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open, waiting for op 10.
    AwaitingHello,
    Identifying,
    Resuming,
    /// READY or RESUMED received.
    Active,
    /// Sleeping before the next attempt.
    ReconnectPending,
    Closing,
    /// Terminal; `stop()` was called or a fatal error occurred.
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Active => "active",
            Self::ReconnectPending => "reconnect_pending",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What survives between sockets of one shard.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    /// Authorization value sent in IDENTIFY and RESUME.
    pub token: Option<SecretString>,
    pub session_id: Option<String>,
    /// Highest dispatch sequence seen; echoed by heartbeats and RESUME.
    pub last_seq: Option<u64>,
    pub heartbeat_interval: Option<Duration>,
    pub shard: [u32; 2],
    /// Consecutive reconnects since the last READY or RESUMED.
    pub reconnect_count: u32,
    /// Whether the next HELLO should be answered with RESUME.
    pub is_resuming: bool,
    /// Set by the idle watchdog: the next reconnect must identify afresh.
    pub disable_reconnect: bool,
}

impl GatewaySession {
    pub fn new(shard: [u32; 2]) -> Self {
        Self {
            token: None,
            session_id: None,
            last_seq: None,
            heartbeat_interval: None,
            shard,
            reconnect_count: 0,
            is_resuming: false,
            disable_reconnect: false,
        }
    }

    /// RESUME is sent only when both the flag and a session id are present.
    pub fn can_resume(&self) -> bool {
        self.is_resuming && self.session_id.is_some()
    }

    /// Track a dispatch sequence number.
    pub fn observe_seq(&mut self, seq: u64) {
        self.last_seq = Some(seq);
    }

    pub fn on_ready(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.reconnect_count = 0;
        self.is_resuming = false;
    }

    pub fn on_resumed(&mut self) {
        self.reconnect_count = 0;
        self.is_resuming = false;
    }

    /// No frame arrived within the idle threshold.
    pub fn on_idle_timeout(&mut self) {
        self.disable_reconnect = true;
        self.is_resuming = false;
    }

    /// The server rejected IDENTIFY or RESUME (op 9).
    pub fn on_invalid_session(&mut self) {
        self.session_id = None;
        self.is_resuming = false;
    }

    /// Apply the close policy and return the delay before reconnecting.
    pub fn on_close(&mut self, config: &GatewayConfig) -> Duration {
        if self.disable_reconnect {
            self.is_resuming = false;
            self.disable_reconnect = false;
        } else {
            self.is_resuming = self.reconnect_count < config.resume_attempt_ceiling;
        }
        self.reconnect_count = self.reconnect_count.saturating_add(1);
        self.reconnect_delay(config)
    }

    /// Base delay, plus the long backoff after repeated failures.
    pub fn reconnect_delay(&self, config: &GatewayConfig) -> Duration {
        let mut delay = config.reconnect_delay();
        if self.reconnect_count >= config.long_backoff_threshold {
            delay += config.long_backoff();
        }
        delay
    }

    /// Forget the session entirely; the next connect identifies.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.last_seq = None;
        self.heartbeat_interval = None;
        self.reconnect_count = 0;
        self.is_resuming = false;
        self.disable_reconnect = false;
    }
}
