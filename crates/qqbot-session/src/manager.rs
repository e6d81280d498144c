//! The scoped session table and its sweep.

use crate::error::SessionError;
use crate::record::{SessionRecord, SessionStatus, TimeoutReply};
use crate::snapshot::SnapshotStore;
use crate::waitfor::WaitForTable;
use crate::Result;
use chrono::{DateTime, Utc};
use qqbot_api::BotApi;
use qqbot_core::config::SessionConfig;
use qqbot_core::{paths, Scope};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// `scope → identity → key → record`. Global records use the empty identity.
pub type SessionTable = BTreeMap<Scope, BTreeMap<String, BTreeMap<String, SessionRecord>>>;

/// Retention for inactive records when none is given.
pub const DEFAULT_INACTIVE_GC_TIMEOUT: Duration = Duration::from_secs(120);

/// Optional parameters of [`SessionManager::create`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Identity within the scope; required for every scope but global.
    pub identity: Option<String>,

    /// Idle time before the record goes inactive.
    pub timeout: Option<Duration>,

    /// Sent through the REST client when the record times out.
    pub timeout_reply: Option<TimeoutReply>,

    /// How long an inactive record is kept; `None` keeps it.
    pub inactive_gc_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            identity: None,
            timeout: None,
            timeout_reply: None,
            inactive_gc_timeout: Some(DEFAULT_INACTIVE_GC_TIMEOUT),
        }
    }
}

impl SessionOptions {
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_reply(mut self, reply: TimeoutReply) -> Self {
        self.timeout_reply = Some(reply);
        self
    }

    pub fn inactive_gc_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inactive_gc_timeout = timeout;
        self
    }
}

/// What one sweep pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records that went ACTIVE → INACTIVE.
    pub timed_out: usize,

    /// Records deleted after their retention.
    pub collected: usize,
}

impl SweepReport {
    /// Whether anything transitioned.
    pub fn changed(&self) -> bool {
        self.timed_out > 0 || self.collected > 0
    }
}

/// Scoped ephemeral state with TTL-driven lifecycle.
pub struct SessionManager {
    bot_id: String,
    table: RwLock<SessionTable>,
    store: Option<SnapshotStore>,
    last_snapshot: Mutex<Option<String>>,
    api: Option<Arc<dyn BotApi>>,
    wait_for: WaitForTable,
    sweep_interval: Duration,
    snapshot_every_ticks: u32,
    sweep: parking_lot::Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("bot_id", &self.bot_id)
            .field("store", &self.store)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// In-memory manager with default sweep settings and no persistence.
    pub fn new(bot_id: impl Into<String>) -> Self {
        let defaults = SessionConfig::default();
        Self {
            bot_id: bot_id.into(),
            table: RwLock::new(SessionTable::new()),
            store: None,
            last_snapshot: Mutex::new(None),
            api: None,
            wait_for: WaitForTable::new(),
            sweep_interval: defaults.sweep_interval(),
            snapshot_every_ticks: defaults.snapshot_every_ticks,
            sweep: parking_lot::Mutex::new(None),
        }
    }

    /// Apply sweep settings, persisting under `commit_dir` when enabled.
    pub fn with_config(mut self, config: &SessionConfig, commit_dir: &Path) -> Self {
        self.sweep_interval = config.sweep_interval();
        self.snapshot_every_ticks = config.snapshot_every_ticks.max(1);
        if config.enabled {
            self.store = Some(SnapshotStore::new(paths::session_snapshot_file(
                commit_dir,
                &self.bot_id,
            )));
        }
        self
    }

    /// Persist through `store`.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Send timeout replies through `api`.
    pub fn with_api(mut self, api: Arc<dyn BotApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Bot this table belongs to.
    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Pending wait-for registrations.
    pub fn wait_for(&self) -> &WaitForTable {
        &self.wait_for
    }

    /// Snapshot store, if persistence is on.
    pub fn store(&self) -> Option<&SnapshotStore> {
        self.store.as_ref()
    }

    // --- Table operations ---

    /// Create (or replace) a record.
    pub async fn create(
        &self,
        scope: Scope,
        key: &str,
        data: Map<String, Value>,
        options: SessionOptions,
    ) -> Result<()> {
        let identity = identity_slot(scope, options.identity.as_deref())?;
        let record = SessionRecord::new(data, Utc::now())
            .with_timeout(options.timeout)
            .with_timeout_reply(options.timeout_reply)
            .with_inactive_gc_timeout(options.inactive_gc_timeout);

        let mut table = self.table.write().await;
        table
            .entry(scope)
            .or_default()
            .entry(identity)
            .or_default()
            .insert(key.to_string(), record);
        Ok(())
    }

    /// Read a record's data, touching it.
    pub async fn get(&self, scope: Scope, key: &str, identity: Option<&str>) -> Result<Map<String, Value>> {
        self.with_record(scope, key, identity, |record| {
            record.touch(Utc::now());
            record.data.clone()
        })
        .await
    }

    /// Merge `data` into a record, touching it. Returns the merged data.
    pub async fn update(
        &self,
        scope: Scope,
        key: &str,
        identity: Option<&str>,
        data: Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        self.with_record(scope, key, identity, |record| {
            record.touch(Utc::now());
            record.data.extend(data);
            record.data.clone()
        })
        .await
    }

    /// Mutate a record's data in place without touching it.
    pub async fn modify<F, R>(&self, scope: Scope, key: &str, identity: Option<&str>, f: F) -> Result<R>
    where
        F: FnOnce(&mut Map<String, Value>) -> R,
    {
        self.with_record(scope, key, identity, |record| f(&mut record.data))
            .await
    }

    /// Force a record inactive.
    pub async fn end(&self, scope: Scope, key: &str, identity: Option<&str>) -> Result<()> {
        self.with_record(scope, key, identity, |record| {
            if record.status != SessionStatus::Inactive {
                record.deactivate(Utc::now());
            }
        })
        .await
    }

    /// Set a record's status.
    pub async fn set_status(
        &self,
        scope: Scope,
        key: &str,
        identity: Option<&str>,
        status: SessionStatus,
    ) -> Result<()> {
        self.with_record(scope, key, identity, |record| {
            let now = Utc::now();
            match status {
                SessionStatus::Active => record.touch(now),
                SessionStatus::Inactive => record.deactivate(now),
                SessionStatus::Hanging => {
                    record.status = SessionStatus::Hanging;
                    record.gc_at = None;
                }
            }
        })
        .await
    }

    /// A record's status.
    pub async fn get_status(&self, scope: Scope, key: &str, identity: Option<&str>) -> Result<SessionStatus> {
        let identity = identity_slot(scope, identity)?;
        let table = self.table.read().await;
        table
            .get(&scope)
            .and_then(|b| b.get(&identity))
            .and_then(|r| r.get(key))
            .map(|r| r.status)
            .ok_or_else(|| not_found(scope, identity.clone(), key))
    }

    /// Delete records.
    ///
    /// With both `identity` and `key` one record goes; with only `identity`
    /// its whole bucket; with only `key` that key under every identity; with
    /// neither the whole scope. Returns how many records were removed.
    pub async fn remove(&self, scope: Scope, identity: Option<&str>, key: Option<&str>) -> usize {
        let identity = if scope.has_identity() { identity } else { Some("") };

        let mut table = self.table.write().await;
        let Some(buckets) = table.get_mut(&scope) else {
            return 0;
        };

        let removed = match (identity, key) {
            (Some(identity), Some(key)) => buckets
                .get_mut(identity)
                .and_then(|records| records.remove(key))
                .map_or(0, |_| 1),
            (Some(identity), None) => buckets.remove(identity).map_or(0, |records| records.len()),
            (None, Some(key)) => buckets
                .values_mut()
                .filter_map(|records| records.remove(key))
                .count(),
            (None, None) => {
                let count = buckets.values().map(BTreeMap::len).sum();
                buckets.clear();
                count
            }
        };

        buckets.retain(|_, records| !records.is_empty());
        if buckets.is_empty() {
            table.remove(&scope);
        }
        removed
    }

    /// A copy of the whole table.
    pub async fn get_all(&self) -> SessionTable {
        self.table.read().await.clone()
    }

    /// Identities holding records in `scope`.
    pub async fn identities(&self, scope: Scope) -> Vec<String> {
        let table = self.table.read().await;
        table
            .get(&scope)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total record count.
    pub async fn len(&self) -> usize {
        let table = self.table.read().await;
        table.values().flat_map(|b| b.values()).map(BTreeMap::len).sum()
    }

    /// Whether no record exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn with_record<F, R>(&self, scope: Scope, key: &str, identity: Option<&str>, f: F) -> Result<R>
    where
        F: FnOnce(&mut SessionRecord) -> R,
    {
        let identity = identity_slot(scope, identity)?;
        let mut table = self.table.write().await;
        let record = table
            .get_mut(&scope)
            .and_then(|b| b.get_mut(&identity))
            .and_then(|r| r.get_mut(key));
        match record {
            Some(record) => Ok(f(record)),
            None => Err(not_found(scope, identity.clone(), key)),
        }
    }

    // --- Persistence ---

    /// Merge the persisted snapshot into the table. Records already in
    /// memory win. Returns how many records were loaded.
    pub async fn load(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let loaded = match store.read().await {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                debug!("No session snapshot at {:?}", store.path());
                return 0;
            }
            Err(e) => {
                warn!("Failed to read session snapshot {:?}: {}", store.path(), e);
                return 0;
            }
        };

        let mut count = 0;
        let mut table = self.table.write().await;
        for (scope, buckets) in loaded {
            for (identity, records) in buckets {
                let bucket = table.entry(scope).or_default().entry(identity).or_default();
                for (key, record) in records {
                    if !bucket.contains_key(&key) {
                        bucket.insert(key, record);
                        count += 1;
                    }
                }
            }
        }

        match SnapshotStore::encode(&table) {
            Ok(json) => *self.last_snapshot.lock().await = Some(json),
            Err(e) => warn!("Failed to encode loaded sessions: {}", e),
        }

        info!("Loaded {} sessions for bot {}", count, self.bot_id);
        count
    }

    /// Write the table to the snapshot file.
    pub async fn commit(&self) -> Result<bool> {
        self.persist(true).await
    }

    /// Write the table only if it differs from the last written snapshot.
    pub async fn commit_if_changed(&self) -> Result<bool> {
        self.persist(false).await
    }

    async fn persist(&self, force: bool) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };

        let json = {
            let table = self.table.read().await;
            SnapshotStore::encode(&table)?
        };

        let mut last = self.last_snapshot.lock().await;
        if !force && last.as_deref() == Some(json.as_str()) {
            return Ok(false);
        }

        store.write(&json).await?;
        *last = Some(json);
        Ok(true)
    }

    // --- Sweep ---

    /// Run one sweep pass as of `now`.
    ///
    /// Times out idle records (queuing their timeout replies), deletes
    /// records past retention, drops empty buckets, and commits the table if
    /// anything transitioned.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut replies = Vec::new();

        {
            let mut table = self.table.write().await;
            for (scope, buckets) in table.iter_mut() {
                buckets.retain(|identity, records| {
                    records.retain(|key, record| {
                        if record.is_timed_out(now) {
                            record.deactivate(now);
                            report.timed_out += 1;
                            info!("Session {}/{}/{} timed out", scope, identity, key);
                            if let Some(reply) = record.timeout_reply.clone() {
                                replies.push(reply);
                            }
                            true
                        } else if record.is_collectable(now) {
                            report.collected += 1;
                            debug!("Collected session {}/{}/{}", scope, identity, key);
                            false
                        } else {
                            true
                        }
                    });
                    !records.is_empty()
                });
            }
            table.retain(|_, buckets| !buckets.is_empty());
        }

        self.send_timeout_replies(replies);

        if report.changed() {
            if let Err(e) = self.commit().await {
                warn!("Failed to commit sessions: {}", e);
            }
        }
        report
    }

    fn send_timeout_replies(&self, replies: Vec<TimeoutReply>) {
        if replies.is_empty() {
            return;
        }
        let Some(api) = &self.api else {
            debug!("No API client, dropping {} timeout replies", replies.len());
            return;
        };

        for reply in replies {
            let api = Arc::clone(api);
            tokio::spawn(async move {
                if let Err(e) = api.reply(&reply.target, &reply.message).await {
                    warn!("Failed to send session timeout reply: {}", e);
                }
            });
        }
    }

    /// Start the background sweep. Restarting replaces the previous task.
    pub fn start(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.sweep.lock().replace(token.clone()) {
            previous.cancel();
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            debug!("Session sweep started every {:?}", manager.sweep_interval);
            let mut ticker = tokio::time::interval(manager.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut tick: u64 = 0;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tick += 1;
                        let report = manager.sweep_once(Utc::now()).await;
                        if !report.changed() && tick % u64::from(manager.snapshot_every_ticks) == 0 {
                            if let Err(e) = manager.commit_if_changed().await {
                                warn!("Failed to commit sessions: {}", e);
                            }
                        }
                    }
                }
            }

            debug!("Session sweep stopped");
        });
    }

    /// Whether the sweep task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .lock()
            .as_ref()
            .map_or(false, |token| !token.is_cancelled())
    }

    /// Stop the sweep and write any unsaved changes.
    pub async fn stop(&self) {
        if let Some(token) = self.sweep.lock().take() {
            token.cancel();
        }
        if let Err(e) = self.commit_if_changed().await {
            warn!("Failed to commit sessions on shutdown: {}", e);
        }
    }
}

fn identity_slot(scope: Scope, identity: Option<&str>) -> Result<String> {
    if !scope.has_identity() {
        return Ok(String::new());
    }
    identity
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(SessionError::MissingIdentity(scope))
}

fn not_found(scope: Scope, identity: String, key: &str) -> SessionError {
    SessionError::NotFound {
        scope,
        identity,
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qqbot_api::{ApiError, BotInfo, GatewayInfo, SentMessage};
    use qqbot_core::{OutboundMessage, ReplyTarget};
    use serde_json::json;
    use tempfile::TempDir;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn later(ms: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::milliseconds(ms)
    }

    #[derive(Default)]
    struct RecordingApi {
        sent: parking_lot::Mutex<Vec<(String, OutboundMessage)>>,
    }

    #[async_trait]
    impl BotApi for RecordingApi {
        async fn authorization(&self) -> qqbot_api::Result<String> {
            Ok("Bot test".to_string())
        }
        async fn bot_info(&self) -> qqbot_api::Result<BotInfo> {
            Ok(BotInfo::default())
        }
        async fn gateway(&self) -> qqbot_api::Result<GatewayInfo> {
            Err(ApiError::Closed)
        }
        async fn send_message(&self, channel_id: &str, message: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
            self.sent.lock().push((channel_id.to_string(), message.clone()));
            Ok(SentMessage::default())
        }
        async fn send_direct_message(&self, _: &str, _: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
            Err(ApiError::Closed)
        }
        async fn send_group_message(&self, _: &str, _: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
            Err(ApiError::Closed)
        }
        async fn send_c2c_message(&self, _: &str, _: &OutboundMessage) -> qqbot_api::Result<SentMessage> {
            Err(ApiError::Closed)
        }
    }

    #[tokio::test]
    async fn test_ttl_lifecycle() {
        let manager = SessionManager::new("bot");
        let options = SessionOptions::default()
            .identity("u1")
            .timeout(Duration::from_millis(100))
            .inactive_gc_timeout(Some(Duration::from_millis(200)));
        manager.create(Scope::User, "k", Map::new(), options).await.unwrap();

        let report = manager.sweep_once(later(150)).await;
        assert_eq!(report.timed_out, 1);
        assert_eq!(
            manager.get_status(Scope::User, "k", Some("u1")).await.unwrap(),
            SessionStatus::Inactive
        );

        // Not yet past retention
        assert_eq!(manager.sweep_once(later(250)).await.collected, 0);

        let report = manager.sweep_once(later(400)).await;
        assert_eq!(report.collected, 1);
        assert!(manager.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_huge_timeouts_survive_sweep() {
        let manager = SessionManager::new("bot");
        let options = SessionOptions::default()
            .identity("u1")
            .timeout(Duration::MAX)
            .inactive_gc_timeout(Some(Duration::MAX));
        manager.create(Scope::User, "k", Map::new(), options).await.unwrap();

        let report = manager.sweep_once(Utc::now()).await;
        assert_eq!(report.timed_out, 0);

        manager.end(Scope::User, "k", Some("u1")).await.unwrap();
        let report = manager.sweep_once(later(60_000)).await;
        assert_eq!(report.collected, 0);
        assert_eq!(
            manager.get_status(Scope::User, "k", Some("u1")).await.unwrap(),
            SessionStatus::Inactive
        );
    }

    #[tokio::test]
    async fn test_get_touches_and_reactivates() {
        let manager = SessionManager::new("bot");
        let options = SessionOptions::default().identity("g1").timeout(Duration::from_secs(60));
        manager
            .create(Scope::Guild, "vote", data(json!({"yes": 1})), options)
            .await
            .unwrap();

        manager.end(Scope::Guild, "vote", Some("g1")).await.unwrap();
        assert_eq!(
            manager.get_status(Scope::Guild, "vote", Some("g1")).await.unwrap(),
            SessionStatus::Inactive
        );

        let got = manager.get(Scope::Guild, "vote", Some("g1")).await.unwrap();
        assert_eq!(got["yes"], 1);
        assert_eq!(
            manager.get_status(Scope::Guild, "vote", Some("g1")).await.unwrap(),
            SessionStatus::Active
        );
    }

    #[tokio::test]
    async fn test_not_found_is_distinct_from_empty() {
        let manager = SessionManager::new("bot");
        manager
            .create(Scope::Global, "empty", Map::new(), SessionOptions::default())
            .await
            .unwrap();

        assert!(manager.get(Scope::Global, "empty", None).await.unwrap().is_empty());
        assert!(matches!(
            manager.get(Scope::Global, "missing", None).await,
            Err(SessionError::NotFound { .. })
        ));
        assert!(matches!(
            manager.get(Scope::User, "empty", None).await,
            Err(SessionError::MissingIdentity(Scope::User))
        ));
    }

    #[tokio::test]
    async fn test_update_merges_and_modify_mutates() {
        let manager = SessionManager::new("bot");
        let options = SessionOptions::default().identity("u1");
        manager
            .create(Scope::User, "form", data(json!({"name": "a", "age": 1})), options)
            .await
            .unwrap();

        let merged = manager
            .update(Scope::User, "form", Some("u1"), data(json!({"age": 2, "city": "x"})))
            .await
            .unwrap();
        assert_eq!(merged, data(json!({"name": "a", "age": 2, "city": "x"})));

        let len = manager
            .modify(Scope::User, "form", Some("u1"), |data| {
                data.remove("city");
                data.len()
            })
            .await
            .unwrap();
        assert_eq!(len, 2);
    }

    #[tokio::test]
    async fn test_remove_granularity() {
        let manager = SessionManager::new("bot");
        for (identity, key) in [("u1", "a"), ("u1", "b"), ("u2", "a"), ("u3", "c")] {
            let options = SessionOptions::default().identity(identity);
            manager.create(Scope::User, key, Map::new(), options).await.unwrap();
        }

        assert_eq!(manager.remove(Scope::User, Some("u1"), Some("b")).await, 1);
        assert_eq!(manager.remove(Scope::User, None, Some("a")).await, 2);
        assert_eq!(manager.identities(Scope::User).await, vec!["u3".to_string()]);
        assert_eq!(manager.remove(Scope::User, Some("u3"), None).await, 1);
        assert_eq!(manager.remove(Scope::User, None, None).await, 0);
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_hanging_is_never_swept() {
        let manager = SessionManager::new("bot");
        let options = SessionOptions::default()
            .identity("c1")
            .timeout(Duration::from_millis(1))
            .inactive_gc_timeout(Some(Duration::from_millis(1)));
        manager.create(Scope::Channel, "topic", Map::new(), options).await.unwrap();
        manager
            .set_status(Scope::Channel, "topic", Some("c1"), SessionStatus::Hanging)
            .await
            .unwrap();

        assert!(!manager.sweep_once(later(10_000)).await.changed());
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_timeout_reply_is_sent() {
        let api = Arc::new(RecordingApi::default());
        let manager = SessionManager::new("bot").with_api(api.clone());
        let reply = TimeoutReply {
            target: ReplyTarget::Channel {
                channel_id: "c1".to_string(),
            },
            message: OutboundMessage::text("too slow"),
        };
        let options = SessionOptions::default()
            .identity("u1")
            .timeout(Duration::from_millis(10))
            .timeout_reply(reply);
        manager.create(Scope::User, "quiz", Map::new(), options).await.unwrap();

        manager.sweep_once(later(50)).await;
        for _ in 0..50 {
            if !api.sent.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let sent = api.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "c1");
        assert_eq!(sent[0].1.content.as_deref(), Some("too slow"));
    }

    #[tokio::test]
    async fn test_transitions_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let config = SessionConfig::default();
        let manager = SessionManager::new("1020").with_config(&config, dir.path());
        let options = SessionOptions::default().identity("u1").timeout(Duration::from_millis(10));
        manager
            .create(Scope::User, "quiz", data(json!({"q": 3})), options)
            .await
            .unwrap();

        manager.sweep_once(later(100)).await;
        let path = dir.path().join("1020.session.json");
        assert!(path.exists());

        let reloaded = SessionManager::new("1020").with_config(&config, dir.path());
        assert_eq!(reloaded.load().await, 1);
        assert_eq!(
            reloaded.get_status(Scope::User, "quiz", Some("u1")).await.unwrap(),
            SessionStatus::Inactive
        );
        // Loading does not dirty the snapshot
        assert!(!reloaded.commit_if_changed().await.unwrap());
    }

    #[tokio::test]
    async fn test_out_of_band_edits_are_detected() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("bot.session.json"));
        let manager = SessionManager::new("bot").with_store(store.clone());
        manager
            .create(Scope::Global, "counter", data(json!({"n": 0})), SessionOptions::default())
            .await
            .unwrap();

        assert!(manager.commit_if_changed().await.unwrap());
        assert!(!manager.commit_if_changed().await.unwrap());

        manager
            .modify(Scope::Global, "counter", None, |data| {
                data.insert("n".to_string(), json!(1));
            })
            .await
            .unwrap();
        assert!(manager.commit_if_changed().await.unwrap());

        let table = store.read().await.unwrap().unwrap();
        assert_eq!(table[&Scope::Global][""]["counter"].data["n"], 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail
        let path = dir.path().join("bot.session.json");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        let manager = SessionManager::new("bot").with_store(SnapshotStore::new(&path));
        let options = SessionOptions::default().identity("u1").timeout(Duration::from_millis(1));
        manager.create(Scope::User, "k", Map::new(), options).await.unwrap();

        let report = manager.sweep_once(later(50)).await;
        assert_eq!(report.timed_out, 1);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_background_sweep() {
        let config = SessionConfig {
            sweep_interval_ms: 10,
            enabled: false,
            ..SessionConfig::default()
        };
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(SessionManager::new("bot").with_config(&config, dir.path()));
        assert!(manager.store().is_none());

        let options = SessionOptions::default()
            .identity("u1")
            .timeout(Duration::from_millis(30))
            .inactive_gc_timeout(Some(Duration::from_millis(30)));
        manager.create(Scope::User, "k", Map::new(), options).await.unwrap();

        manager.start();
        assert!(manager.is_sweeping());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(manager.get_all().await.is_empty());

        manager.stop().await;
        assert!(!manager.is_sweeping());
    }
}
