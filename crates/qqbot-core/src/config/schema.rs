//! Configuration schema definitions.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main qqbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot credentials.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// REST client settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Gateway connection settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Scoped session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bot credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Application ID (bot app id).
    #[serde(default)]
    pub app_id: String,

    /// Legacy bot token, used as `Bot {app_id}.{token}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,

    /// App secret, exchanged for short-lived access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretString>,
}

/// REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Use the sandbox API host.
    #[serde(default)]
    pub sandbox: bool,

    /// Override the API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Maximum simultaneous outbound API calls.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            sandbox: false,
            base_url: None,
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl ApiConfig {
    /// Resolve the base URL for REST calls.
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.sandbox => "https://sandbox.api.sgroup.qq.com".to_string(),
            None => "https://api.sgroup.qq.com".to_string(),
        }
    }
}

fn default_max_concurrency() -> usize {
    10
}

fn default_api_timeout() -> u64 {
    20
}

/// Gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Number of shards to open; defaults to the gateway recommendation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_total: Option<u32>,

    /// Force-close the socket after this long without any inbound frame.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Consecutive reconnects that still attempt RESUME.
    #[serde(default = "default_resume_ceiling")]
    pub resume_attempt_ceiling: u32,

    /// Fixed delay before each reconnect attempt.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Consecutive failures after which the long backoff applies.
    #[serde(default = "default_long_backoff_threshold")]
    pub long_backoff_threshold: u32,

    /// Extra delay once `long_backoff_threshold` is reached.
    #[serde(default = "default_long_backoff")]
    pub long_backoff_ms: u64,

    /// Lower bound of the jittered delay after an invalid session.
    #[serde(default = "default_invalid_session_min")]
    pub invalid_session_delay_min_ms: u64,

    /// Upper bound of the jittered delay after an invalid session.
    #[serde(default = "default_invalid_session_max")]
    pub invalid_session_delay_max_ms: u64,

    /// Capacity of the sequence de-duplication ring.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Delay between starting consecutive shards.
    #[serde(default = "default_shard_start_interval")]
    pub shard_start_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            shard_total: None,
            idle_timeout_secs: default_idle_timeout(),
            resume_attempt_ceiling: default_resume_ceiling(),
            reconnect_delay_ms: default_reconnect_delay(),
            long_backoff_threshold: default_long_backoff_threshold(),
            long_backoff_ms: default_long_backoff(),
            invalid_session_delay_min_ms: default_invalid_session_min(),
            invalid_session_delay_max_ms: default_invalid_session_max(),
            dedup_capacity: default_dedup_capacity(),
            shard_start_interval_ms: default_shard_start_interval(),
        }
    }
}

impl GatewayConfig {
    /// Idle watchdog threshold.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Base reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Long backoff delay.
    pub fn long_backoff(&self) -> Duration {
        Duration::from_millis(self.long_backoff_ms)
    }
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_resume_ceiling() -> u32 {
    3
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_long_backoff_threshold() -> u32 {
    5
}

fn default_long_backoff() -> u64 {
    10_000
}

fn default_invalid_session_min() -> u64 {
    1000
}

fn default_invalid_session_max() -> u64 {
    5000
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_shard_start_interval() -> u64 {
    5000
}

/// How handler bodies are executed relative to the dispatch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Await each handler on the dispatch loop.
    Inline,
    /// Spawn each handler as its own task.
    #[default]
    Spawn,
    /// Run handlers on a bounded pool of blocking threads.
    Blocking,
}

/// Which guild message subscription to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    /// All guild messages (private bots only).
    All,
    /// Only messages that mention the bot.
    #[default]
    AtOnly,
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Handler execution mode.
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Worker bound for [`ExecutionMode::Blocking`].
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Guild message intent.
    #[serde(default)]
    pub message_intent: MessageIntent,

    /// Log a hint when the platform refuses the requested intents.
    #[serde(default = "default_true")]
    pub no_permission_warning: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::default(),
            worker_threads: default_worker_threads(),
            message_intent: MessageIntent::default(),
            no_permission_warning: true,
        }
    }
}

fn default_worker_threads() -> usize {
    8
}

fn default_true() -> bool {
    true
}

/// Scoped session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Run the sweep task and persist snapshots.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for persisted snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_dir: Option<PathBuf>,

    /// Sweep tick.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Re-serialise and compare the table every this many ticks.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commit_dir: None,
            sweep_interval_ms: default_sweep_interval(),
            snapshot_every_ticks: default_snapshot_every(),
        }
    }
}

impl SessionConfig {
    /// Sweep tick as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_sweep_interval() -> u64 {
    500
}

fn default_snapshot_every() -> u32 {
    20
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
