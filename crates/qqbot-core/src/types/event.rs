//! Typed gateway events.
//!
//! Every dispatch payload is decoded once, at the transport boundary, into an
//! [`Event`]. Unknown event types survive as [`Event::Raw`].

use super::intents::Intents;
use super::message::MessageEvent;
use super::scene::Scene;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

macro_rules! event_types {
    ($($variant:ident => $name:literal, $intent:expr;)+) => {
        /// Known dispatch event types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventType {
            $($variant,)+
        }

        impl EventType {
            /// Every known event type.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant,)+];

            /// The `t` field value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// Parse a `t` field value.
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// The intent that subscribes to this event.
            pub fn intent(self) -> Intents {
                match self {
                    $(Self::$variant => $intent,)+
                }
            }
        }
    };
}

event_types! {
    Ready => "READY", Intents::empty();
    Resumed => "RESUMED", Intents::empty();

    GuildCreate => "GUILD_CREATE", Intents::GUILDS;
    GuildUpdate => "GUILD_UPDATE", Intents::GUILDS;
    GuildDelete => "GUILD_DELETE", Intents::GUILDS;
    ChannelCreate => "CHANNEL_CREATE", Intents::GUILDS;
    ChannelUpdate => "CHANNEL_UPDATE", Intents::GUILDS;
    ChannelDelete => "CHANNEL_DELETE", Intents::GUILDS;

    GuildMemberAdd => "GUILD_MEMBER_ADD", Intents::GUILD_MEMBERS;
    GuildMemberUpdate => "GUILD_MEMBER_UPDATE", Intents::GUILD_MEMBERS;
    GuildMemberRemove => "GUILD_MEMBER_REMOVE", Intents::GUILD_MEMBERS;

    MessageCreate => "MESSAGE_CREATE", Intents::GUILD_MESSAGES;
    MessageDelete => "MESSAGE_DELETE", Intents::GUILD_MESSAGES;

    MessageReactionAdd => "MESSAGE_REACTION_ADD", Intents::GUILD_MESSAGE_REACTIONS;
    MessageReactionRemove => "MESSAGE_REACTION_REMOVE", Intents::GUILD_MESSAGE_REACTIONS;

    DirectMessageCreate => "DIRECT_MESSAGE_CREATE", Intents::DIRECT_MESSAGE;
    DirectMessageDelete => "DIRECT_MESSAGE_DELETE", Intents::DIRECT_MESSAGE;

    OpenForumThreadCreate => "OPEN_FORUM_THREAD_CREATE", Intents::OPEN_FORUMS_EVENT;
    OpenForumThreadUpdate => "OPEN_FORUM_THREAD_UPDATE", Intents::OPEN_FORUMS_EVENT;
    OpenForumThreadDelete => "OPEN_FORUM_THREAD_DELETE", Intents::OPEN_FORUMS_EVENT;
    OpenForumPostCreate => "OPEN_FORUM_POST_CREATE", Intents::OPEN_FORUMS_EVENT;
    OpenForumPostDelete => "OPEN_FORUM_POST_DELETE", Intents::OPEN_FORUMS_EVENT;
    OpenForumReplyCreate => "OPEN_FORUM_REPLY_CREATE", Intents::OPEN_FORUMS_EVENT;
    OpenForumReplyDelete => "OPEN_FORUM_REPLY_DELETE", Intents::OPEN_FORUMS_EVENT;

    AudioOrLiveChannelMemberEnter => "AUDIO_OR_LIVE_CHANNEL_MEMBER_ENTER", Intents::AUDIO_OR_LIVE_CHANNEL_MEMBER;
    AudioOrLiveChannelMemberExit => "AUDIO_OR_LIVE_CHANNEL_MEMBER_EXIT", Intents::AUDIO_OR_LIVE_CHANNEL_MEMBER;

    C2cMessageCreate => "C2C_MESSAGE_CREATE", Intents::GROUP_AND_C2C_EVENT;
    GroupAtMessageCreate => "GROUP_AT_MESSAGE_CREATE", Intents::GROUP_AND_C2C_EVENT;
    FriendAdd => "FRIEND_ADD", Intents::GROUP_AND_C2C_EVENT;
    FriendDel => "FRIEND_DEL", Intents::GROUP_AND_C2C_EVENT;
    C2cMsgReject => "C2C_MSG_REJECT", Intents::GROUP_AND_C2C_EVENT;
    C2cMsgReceive => "C2C_MSG_RECEIVE", Intents::GROUP_AND_C2C_EVENT;
    GroupAddRobot => "GROUP_ADD_ROBOT", Intents::GROUP_AND_C2C_EVENT;
    GroupDelRobot => "GROUP_DEL_ROBOT", Intents::GROUP_AND_C2C_EVENT;
    GroupMsgReject => "GROUP_MSG_REJECT", Intents::GROUP_AND_C2C_EVENT;
    GroupMsgReceive => "GROUP_MSG_RECEIVE", Intents::GROUP_AND_C2C_EVENT;

    InteractionCreate => "INTERACTION_CREATE", Intents::INTERACTION;

    MessageAuditPass => "MESSAGE_AUDIT_PASS", Intents::MESSAGE_AUDIT;
    MessageAuditReject => "MESSAGE_AUDIT_REJECT", Intents::MESSAGE_AUDIT;

    ForumThreadCreate => "FORUM_THREAD_CREATE", Intents::FORUMS_EVENT;
    ForumThreadUpdate => "FORUM_THREAD_UPDATE", Intents::FORUMS_EVENT;
    ForumThreadDelete => "FORUM_THREAD_DELETE", Intents::FORUMS_EVENT;
    ForumPostCreate => "FORUM_POST_CREATE", Intents::FORUMS_EVENT;
    ForumPostDelete => "FORUM_POST_DELETE", Intents::FORUMS_EVENT;
    ForumReplyCreate => "FORUM_REPLY_CREATE", Intents::FORUMS_EVENT;
    ForumReplyDelete => "FORUM_REPLY_DELETE", Intents::FORUMS_EVENT;
    ForumPublishAuditResult => "FORUM_PUBLISH_AUDIT_RESULT", Intents::FORUMS_EVENT;

    AudioStart => "AUDIO_START", Intents::AUDIO_ACTION;
    AudioFinish => "AUDIO_FINISH", Intents::AUDIO_ACTION;
    AudioOnMic => "AUDIO_ON_MIC", Intents::AUDIO_ACTION;
    AudioOffMic => "AUDIO_OFF_MIC", Intents::AUDIO_ACTION;

    AtMessageCreate => "AT_MESSAGE_CREATE", Intents::PUBLIC_GUILD_MESSAGES;
    PublicMessageDelete => "PUBLIC_MESSAGE_DELETE", Intents::PUBLIC_GUILD_MESSAGES;
}

impl EventType {
    /// The scene of a message-class event; `None` for every other event.
    pub fn message_scene(self) -> Option<Scene> {
        match self {
            Self::MessageCreate | Self::AtMessageCreate => Some(Scene::Guild),
            Self::DirectMessageCreate => Some(Scene::Dm),
            Self::GroupAtMessageCreate => Some(Scene::Group),
            Self::C2cMessageCreate => Some(Scene::C2c),
            _ => None,
        }
    }

    /// Whether this event goes through command matching.
    pub fn is_message(self) -> bool {
        self.message_scene().is_some()
    }

    /// Whether this event is handled by the connection itself.
    pub fn is_lifecycle(self) -> bool {
        matches!(self, Self::Ready | Self::Resumed)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guild was created, updated, or the bot left it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
    #[serde(default)]
    pub op_user_id: Option<String>,
}

/// A channel was created, updated, or deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<u32>,
    #[serde(default)]
    pub op_user_id: Option<String>,
}

/// User part of a member event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// A member joined, changed, or left a guild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberEvent {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub user: EventUser,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub joined_at: Option<String>,
    #[serde(default)]
    pub op_user_id: Option<String>,
}

/// Reaction target (message, post, comment, reply).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionTarget {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Value,
}

/// Emoji of a reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: u32,
}

/// A reaction was added or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub target: ReactionTarget,
    #[serde(default)]
    pub emoji: Emoji,
}

/// A button or callback interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: u32,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub chat_type: Option<u32>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub group_openid: Option<String>,
    #[serde(default)]
    pub group_member_openid: Option<String>,
    #[serde(default)]
    pub user_openid: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Result of a message audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(default)]
    pub audit_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub audit_time: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub seq_in_channel: Option<String>,
}

/// Forum thread/post/reply activity, public or private.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForumEvent {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub thread_info: Option<Value>,
    #[serde(default)]
    pub post_info: Option<Value>,
    #[serde(default)]
    pub reply_info: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Audio playback state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioEvent {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Someone entered or left an audio/live channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveChannelMemberEvent {
    #[serde(default)]
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_type: u32,
    #[serde(default)]
    pub user_id: String,
}

/// Bot added to/removed from a group, or group push toggled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    #[serde(default)]
    pub group_openid: String,
    #[serde(default)]
    pub op_member_openid: String,
    #[serde(default)]
    pub timestamp: Value,
}

/// Friend added/removed, or C2C push toggled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FriendEvent {
    #[serde(default)]
    pub openid: String,
    #[serde(default)]
    pub timestamp: Value,
}

/// A message was recalled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeleteEvent {
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub op_user: Option<EventUser>,
}

/// A decoded dispatch event.
#[derive(Debug, Clone)]
pub enum Event {
    Message(Box<MessageEvent>),
    MessageDelete(EventType, MessageDeleteEvent),
    Guild(EventType, GuildEvent),
    Channel(EventType, ChannelEvent),
    Member(EventType, MemberEvent),
    Reaction(EventType, ReactionEvent),
    Interaction(EventType, InteractionEvent),
    Audit(EventType, AuditEvent),
    Forum(EventType, ForumEvent),
    Audio(EventType, AudioEvent),
    LiveChannelMember(EventType, LiveChannelMemberEvent),
    Group(EventType, GroupEvent),
    Friend(EventType, FriendEvent),
    /// READY/RESUMED and any type this crate does not model.
    Raw {
        event_type: String,
        payload: Value,
    },
}

impl Event {
    /// Decode a dispatch payload.
    pub fn decode(
        event_type: &str,
        payload: Value,
        event_id: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        use EventType as T;

        let Some(kind) = EventType::parse(event_type) else {
            return Ok(Self::Raw {
                event_type: event_type.to_string(),
                payload,
            });
        };

        if kind.is_message() {
            return MessageEvent::decode(kind, payload, event_id).map(|m| Self::Message(Box::new(m)));
        }

        let event = match kind {
            T::Ready | T::Resumed => Self::Raw {
                event_type: event_type.to_string(),
                payload,
            },
            T::GuildCreate | T::GuildUpdate | T::GuildDelete => {
                Self::Guild(kind, serde_json::from_value(payload)?)
            }
            T::ChannelCreate | T::ChannelUpdate | T::ChannelDelete => {
                Self::Channel(kind, serde_json::from_value(payload)?)
            }
            T::GuildMemberAdd | T::GuildMemberUpdate | T::GuildMemberRemove => {
                Self::Member(kind, serde_json::from_value(payload)?)
            }
            T::MessageDelete | T::DirectMessageDelete | T::PublicMessageDelete => {
                Self::MessageDelete(kind, serde_json::from_value(payload)?)
            }
            T::MessageReactionAdd | T::MessageReactionRemove => {
                Self::Reaction(kind, serde_json::from_value(payload)?)
            }
            T::InteractionCreate => Self::Interaction(kind, serde_json::from_value(payload)?),
            T::MessageAuditPass | T::MessageAuditReject => {
                Self::Audit(kind, serde_json::from_value(payload)?)
            }
            T::AudioStart | T::AudioFinish | T::AudioOnMic | T::AudioOffMic => {
                Self::Audio(kind, serde_json::from_value(payload)?)
            }
            T::AudioOrLiveChannelMemberEnter | T::AudioOrLiveChannelMemberExit => {
                Self::LiveChannelMember(kind, serde_json::from_value(payload)?)
            }
            T::GroupAddRobot | T::GroupDelRobot | T::GroupMsgReject | T::GroupMsgReceive => {
                Self::Group(kind, serde_json::from_value(payload)?)
            }
            T::FriendAdd | T::FriendDel | T::C2cMsgReject | T::C2cMsgReceive => {
                Self::Friend(kind, serde_json::from_value(payload)?)
            }
            // Remaining types are forum activity
            _ => Self::Forum(kind, serde_json::from_value(payload)?),
        };

        Ok(event)
    }

    /// The typed event type, if known.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Self::Message(m) => Some(m.event_type),
            Self::MessageDelete(t, _)
            | Self::Guild(t, _)
            | Self::Channel(t, _)
            | Self::Member(t, _)
            | Self::Reaction(t, _)
            | Self::Interaction(t, _)
            | Self::Audit(t, _)
            | Self::Forum(t, _)
            | Self::Audio(t, _)
            | Self::LiveChannelMember(t, _)
            | Self::Group(t, _)
            | Self::Friend(t, _) => Some(*t),
            Self::Raw { event_type, .. } => EventType::parse(event_type),
        }
    }

    /// The `t` value this event was decoded from.
    pub fn name(&self) -> &str {
        match self {
            Self::Raw { event_type, .. } => event_type,
            other => other.event_type().map(EventType::as_str).unwrap_or("UNKNOWN"),
        }
    }
}
