//! Gateway intents bitmask.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of subscribed event categories, sent with IDENTIFY.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u32);

impl Intents {
    /// Guild create/update/delete and channel events.
    pub const GUILDS: Self = Self(1 << 0);
    /// Guild member add/update/remove.
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    /// Every guild message (private bots).
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    /// Message reactions.
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    /// Direct messages.
    pub const DIRECT_MESSAGE: Self = Self(1 << 12);
    /// Public forum events.
    pub const OPEN_FORUMS_EVENT: Self = Self(1 << 18);
    /// Audio/live channel member enter and exit.
    pub const AUDIO_OR_LIVE_CHANNEL_MEMBER: Self = Self(1 << 19);
    /// Group and C2C messages, friend events.
    pub const GROUP_AND_C2C_EVENT: Self = Self(1 << 25);
    /// Button interactions.
    pub const INTERACTION: Self = Self(1 << 26);
    /// Message audit results.
    pub const MESSAGE_AUDIT: Self = Self(1 << 27);
    /// Forum events (private bots).
    pub const FORUMS_EVENT: Self = Self(1 << 28);
    /// Audio playback events.
    pub const AUDIO_ACTION: Self = Self(1 << 29);
    /// Guild messages that mention the bot.
    pub const PUBLIC_GUILD_MESSAGES: Self = Self(1 << 30);

    const NAMED: [(Self, &'static str); 13] = [
        (Self::GUILDS, "guilds"),
        (Self::GUILD_MEMBERS, "guild_members"),
        (Self::GUILD_MESSAGES, "guild_messages"),
        (Self::GUILD_MESSAGE_REACTIONS, "guild_message_reactions"),
        (Self::DIRECT_MESSAGE, "direct_message"),
        (Self::OPEN_FORUMS_EVENT, "open_forums_event"),
        (Self::AUDIO_OR_LIVE_CHANNEL_MEMBER, "audio_or_live_channel_member"),
        (Self::GROUP_AND_C2C_EVENT, "group_and_c2c_event"),
        (Self::INTERACTION, "interaction"),
        (Self::MESSAGE_AUDIT, "message_audit"),
        (Self::FORUMS_EVENT, "forums_event"),
        (Self::AUDIO_ACTION, "audio_action"),
        (Self::PUBLIC_GUILD_MESSAGES, "public_guild_messages"),
    ];

    /// No intents.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set the bits in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Names of the set bits, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.0, self.names().join(", "))
    }
}
