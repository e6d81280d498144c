//! Outbound message payloads and reply routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a reply is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyTarget {
    /// A guild text channel.
    Channel { channel_id: String },
    /// A direct-message session, addressed by its DM guild id.
    Direct { guild_id: String },
    /// A group chat.
    Group { group_openid: String },
    /// A one-to-one chat.
    C2c { openid: String },
}

/// Rich-text message type values accepted by the send endpoints.
pub mod msg_type {
    pub const TEXT: u8 = 0;
    pub const MARKDOWN: u8 = 2;
    pub const ARK: u8 = 3;
    pub const EMBED: u8 = 4;
    pub const MEDIA: u8 = 7;
}

/// Body of a send-message call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Message type (group and C2C endpoints).
    #[serde(default)]
    pub msg_type: u8,

    /// Inbound message id, making this a passive reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,

    /// Inbound event id, for passive replies to non-message events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Reply sequence for repeated passive replies to one message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_seq: Option<u32>,

    /// Image URL (guild endpoints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Markdown payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<Value>,

    /// Keyboard payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Value>,
}

impl OutboundMessage {
    /// A plain text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            msg_type: msg_type::TEXT,
            ..Default::default()
        }
    }

    /// Mark as a passive reply to an inbound message.
    pub fn reply_to(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = Some(msg_id.into());
        self
    }

    /// Mark as a passive reply to an inbound event.
    pub fn for_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Set the reply sequence.
    pub fn with_seq(mut self, seq: u32) -> Self {
        self.msg_seq = Some(seq);
        self
    }

    /// Attach an image URL.
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_reply_serialization() {
        let msg = OutboundMessage::text("pong").reply_to("m1").with_seq(2);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"content": "pong", "msg_type": 0, "msg_id": "m1", "msg_seq": 2})
        );
    }

    #[test]
    fn test_reply_target_is_tagged() {
        let target = ReplyTarget::Group {
            group_openid: "G1".to_string(),
        };
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value, json!({"kind": "group", "group_openid": "G1"}));
        let back: ReplyTarget = serde_json::from_value(value).unwrap();
        assert_eq!(back, target);
    }
}
