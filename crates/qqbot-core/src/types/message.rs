//! Message-class events.

use super::event::EventType;
use super::outbound::ReplyTarget;
use super::scene::{Scene, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role ids that count as administrators (guild owner, channel admin).
pub const ADMIN_ROLES: [&str; 2] = ["2", "4"];

/// Message author.
///
/// Guild and DM messages carry `id`; group messages carry `member_openid`;
/// C2C messages carry `user_openid`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub member_openid: Option<String>,
    #[serde(default)]
    pub user_openid: Option<String>,
    #[serde(default)]
    pub union_openid: Option<String>,
}

/// Guild membership of the author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub joined_at: Option<String>,
}

/// File or image attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    author: Author,
    #[serde(default)]
    member: Option<Member>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    group_openid: Option<String>,
    #[serde(default)]
    src_guild_id: Option<String>,
    #[serde(default)]
    mentions: Vec<Author>,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

/// A message from a guild channel, DM, group, or C2C chat.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// The dispatch type this message arrived as.
    pub event_type: EventType,

    /// Scene derived from the event type.
    pub scene: Scene,

    /// Message id.
    pub id: String,

    /// Event id from the envelope.
    pub event_id: Option<String>,

    /// Raw content.
    pub content: String,

    /// Content with the bot mention, leading `/`, entities and NBSPs
    /// normalised. Set by the dispatcher.
    pub treated_msg: Option<String>,

    /// Sending time as reported by the platform.
    pub timestamp: Option<String>,

    pub author: Author,
    pub member: Option<Member>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub group_openid: Option<String>,

    /// Guild the DM was started from.
    pub src_guild_id: Option<String>,

    pub mentions: Vec<Author>,
    pub attachments: Vec<Attachment>,

    /// The undecoded payload.
    pub raw: Value,
}

impl MessageEvent {
    /// Decode a message-class payload.
    pub fn decode(
        event_type: EventType,
        payload: Value,
        event_id: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let scene = event_type.message_scene().unwrap_or(Scene::Guild);
        let wire: WireMessage = serde_json::from_value(payload.clone())?;

        Ok(Self {
            event_type,
            scene,
            id: wire.id,
            event_id,
            content: wire.content,
            treated_msg: None,
            timestamp: wire.timestamp,
            author: wire.author,
            member: wire.member,
            guild_id: wire.guild_id,
            channel_id: wire.channel_id,
            group_openid: wire.group_openid,
            src_guild_id: wire.src_guild_id,
            mentions: wire.mentions,
            attachments: wire.attachments,
            raw: payload,
        })
    }

    /// Id of the sender in this scene.
    pub fn user_id(&self) -> Option<&str> {
        let id = match self.scene {
            Scene::Guild | Scene::Dm => self.author.id.as_deref(),
            Scene::Group => self
                .author
                .member_openid
                .as_deref()
                .or(self.author.id.as_deref()),
            Scene::C2c => self
                .author
                .user_openid
                .as_deref()
                .or(self.author.id.as_deref()),
        };
        id.filter(|s| !s.is_empty())
    }

    /// The identity this message has in `scope`; `None` if the message
    /// has none (e.g. a group id for a guild message). Global has none.
    pub fn identity(&self, scope: Scope) -> Option<&str> {
        let id = match scope {
            Scope::User => self.user_id(),
            Scope::Guild => self.guild_id.as_deref(),
            Scope::Channel => self.channel_id.as_deref(),
            Scope::Group => self.group_openid.as_deref(),
            Scope::Global => None,
        };
        id.filter(|s| !s.is_empty())
    }

    /// Roles of the author; empty outside guilds.
    pub fn roles(&self) -> &[String] {
        self.member.as_ref().map(|m| m.roles.as_slice()).unwrap_or(&[])
    }

    /// Whether the author holds an administrator role.
    pub fn is_admin(&self) -> bool {
        self.roles()
            .iter()
            .any(|r| ADMIN_ROLES.contains(&r.as_str()))
    }

    /// Whether `user_id` is in the mentions list.
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions
            .iter()
            .any(|m| m.id.as_deref() == Some(user_id))
    }

    /// Where a reply to this message goes.
    pub fn reply_target(&self) -> Option<ReplyTarget> {
        match self.scene {
            Scene::Guild => self.channel_id.clone().map(|channel_id| ReplyTarget::Channel { channel_id }),
            Scene::Dm => self.guild_id.clone().map(|guild_id| ReplyTarget::Direct { guild_id }),
            Scene::Group => self
                .group_openid
                .clone()
                .map(|group_openid| ReplyTarget::Group { group_openid }),
            Scene::C2c => self
                .user_id()
                .map(|openid| ReplyTarget::C2c { openid: openid.to_string() }),
        }
    }

    /// The treated content if set, otherwise the raw content.
    pub fn text(&self) -> &str {
        self.treated_msg.as_deref().unwrap_or(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn guild_message(roles: Value) -> MessageEvent {
        MessageEvent::decode(
            EventType::AtMessageCreate,
            json!({
                "id": "m1",
                "content": "<@!99> /ping",
                "guild_id": "g1",
                "channel_id": "c1",
                "author": {"id": "u1", "username": "neo"},
                "member": {"roles": roles},
                "mentions": [{"id": "99", "bot": true}],
            }),
            Some("AT_MESSAGE_CREATE:e1".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_guild_message_identities() {
        let msg = guild_message(json!(["1"]));
        assert_eq!(msg.scene, Scene::Guild);
        assert_eq!(msg.identity(Scope::User), Some("u1"));
        assert_eq!(msg.identity(Scope::Guild), Some("g1"));
        assert_eq!(msg.identity(Scope::Channel), Some("c1"));
        assert_eq!(msg.identity(Scope::Group), None);
        assert_eq!(msg.identity(Scope::Global), None);
        assert!(msg.mentions_user("99"));
        assert_eq!(
            msg.reply_target(),
            Some(ReplyTarget::Channel { channel_id: "c1".to_string() })
        );
    }

    #[test]
    fn test_admin_roles() {
        assert!(!guild_message(json!([])).is_admin());
        assert!(!guild_message(json!(["1", "5"])).is_admin());
        assert!(guild_message(json!(["2"])).is_admin());
        assert!(guild_message(json!(["11", "4"])).is_admin());
    }

    #[test]
    fn test_group_and_c2c_identities() {
        let group = MessageEvent::decode(
            EventType::GroupAtMessageCreate,
            json!({"id": "m2", "content": " hi", "group_openid": "G1", "author": {"member_openid": "M1"}}),
            None,
        )
        .unwrap();
        assert_eq!(group.scene, Scene::Group);
        assert_eq!(group.identity(Scope::User), Some("M1"));
        assert_eq!(group.identity(Scope::Group), Some("G1"));
        assert!(group.roles().is_empty());

        let c2c = MessageEvent::decode(
            EventType::C2cMessageCreate,
            json!({"id": "m3", "content": "yo", "author": {"user_openid": "O1"}}),
            None,
        )
        .unwrap();
        assert_eq!(
            c2c.reply_target(),
            Some(ReplyTarget::C2c { openid: "O1".to_string() })
        );
    }

    #[test]
    fn test_text_prefers_treated() {
        let mut msg = guild_message(json!([]));
        assert_eq!(msg.text(), "<@!99> /ping");
        msg.treated_msg = Some("ping".to_string());
        assert_eq!(msg.text(), "ping");
    }
}
