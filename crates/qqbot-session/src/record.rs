//! Session records and their lifecycle.

use chrono::{DateTime, Utc};
use qqbot_core::{OutboundMessage, ReplyTarget};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Lifecycle status of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Live; subject to the idle timeout.
    #[default]
    Active,

    /// Timed out or ended; subject to collection.
    Inactive,

    /// Parked by application code; the sweep leaves it alone.
    Hanging,
}

/// Message sent when a record times out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutReply {
    pub target: ReplyTarget,
    pub message: OutboundMessage,
}

/// One piece of scoped state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub status: SessionStatus,

    #[serde(default)]
    pub data: Map<String, Value>,

    /// Idle seconds before going inactive; `None` never times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,

    pub last_operate_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_reply: Option<TimeoutReply>,

    /// Seconds an inactive record is kept; `None` keeps it forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_gc_timeout_secs: Option<f64>,

    /// When an inactive record becomes collectable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Create an active record.
    pub fn new(data: Map<String, Value>, now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Active,
            data,
            timeout_secs: None,
            last_operate_at: now,
            timeout_reply: None,
            inactive_gc_timeout_secs: None,
            gc_at: None,
        }
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_secs = timeout.map(|d| d.as_secs_f64());
        self
    }

    /// Set the inactive retention.
    pub fn with_inactive_gc_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inactive_gc_timeout_secs = timeout.map(|d| d.as_secs_f64());
        self
    }

    /// Set the timeout reply.
    pub fn with_timeout_reply(mut self, reply: Option<TimeoutReply>) -> Self {
        self.timeout_reply = reply;
        self
    }

    /// Record an access: refresh the idle clock and force ACTIVE.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_operate_at = now;
        self.status = SessionStatus::Active;
        self.gc_at = None;
    }

    /// Whether an active record has been idle past its timeout.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        match self.timeout_secs {
            Some(secs) => deadline(self.last_operate_at, secs).map_or(false, |at| now >= at),
            None => false,
        }
    }

    /// Go inactive at `now`, arming the collection deadline.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Inactive;
        self.gc_at = self.inactive_gc_timeout_secs.and_then(|secs| deadline(now, secs));
    }

    /// Whether an inactive record is past its collection deadline.
    pub fn is_collectable(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Inactive && self.gc_at.map_or(false, |at| now >= at)
    }
}

/// `from + secs`, or `None` when the instant is past what a timestamp can hold.
fn deadline(from: DateTime<Utc>, secs: f64) -> Option<DateTime<Utc>> {
    let millis = (secs.max(0.0) * 1000.0).round();
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return None;
    }
    from.checked_add_signed(chrono::Duration::milliseconds(millis as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    #[test]
    fn test_timeout_then_collection() {
        let start = Utc::now();
        let mut record = SessionRecord::new(Map::new(), start)
            .with_timeout(Some(Duration::from_millis(100)))
            .with_inactive_gc_timeout(Some(Duration::from_secs(1)));

        assert!(!record.is_timed_out(start + ms(50)));
        assert!(record.is_timed_out(start + ms(100)));

        let inactive_at = start + ms(150);
        record.deactivate(inactive_at);
        assert_eq!(record.status, SessionStatus::Inactive);
        assert!(record.gc_at.unwrap() >= inactive_at);
        assert!(!record.is_timed_out(inactive_at + ms(500)));
        assert!(!record.is_collectable(inactive_at + ms(999)));
        assert!(record.is_collectable(inactive_at + ms(1000)));
    }

    #[test]
    fn test_touch_reactivates() {
        let start = Utc::now();
        let mut record = SessionRecord::new(Map::new(), start)
            .with_inactive_gc_timeout(Some(Duration::from_secs(1)));
        record.deactivate(start);
        assert!(record.gc_at.is_some());

        record.touch(start + ms(10));
        assert_eq!(record.status, SessionStatus::Active);
        assert!(record.gc_at.is_none());
        assert_eq!(record.last_operate_at, start + ms(10));
    }

    #[test]
    fn test_no_timeout_never_expires() {
        let start = Utc::now();
        let record = SessionRecord::new(Map::new(), start);
        assert!(!record.is_timed_out(start + chrono::Duration::days(365)));
    }

    #[test]
    fn test_hanging_and_uncollected() {
        let start = Utc::now();
        let mut record = SessionRecord::new(Map::new(), start)
            .with_timeout(Some(Duration::from_millis(1)));
        record.status = SessionStatus::Hanging;
        assert!(!record.is_timed_out(start + ms(100)));

        // No retention configured: inactive forever
        record.deactivate(start);
        assert!(record.gc_at.is_none());
        assert!(!record.is_collectable(start + chrono::Duration::days(1)));
    }

    #[test]
    fn test_unrepresentable_timeouts_mean_never() {
        let start = Utc::now();
        let mut record = SessionRecord::new(Map::new(), start)
            .with_timeout(Some(Duration::MAX))
            .with_inactive_gc_timeout(Some(Duration::MAX));
        assert!(!record.is_timed_out(start + chrono::Duration::days(365)));

        record.deactivate(start);
        assert_eq!(record.status, SessionStatus::Inactive);
        assert!(record.gc_at.is_none());
        assert!(!record.is_collectable(start + chrono::Duration::days(365)));

        // A snapshot can carry any f64
        record.timeout_secs = Some(1e300);
        record.status = SessionStatus::Active;
        assert!(!record.is_timed_out(start));
    }

    #[test]
    fn test_record_serialization_shape() {
        let mut data = Map::new();
        data.insert("step".to_string(), json!(2));
        let record = SessionRecord::new(data, Utc::now()).with_timeout(Some(Duration::from_secs(30)));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "ACTIVE");
        assert_eq!(value["data"]["step"], 2);
        assert_eq!(value["timeout_secs"], 30.0);
        assert!(value.get("gc_at").is_none());

        let back: SessionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
