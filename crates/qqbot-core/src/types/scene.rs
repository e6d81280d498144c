//! Message scenes and session scopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Where a message-class event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
    /// Guild text channel.
    Guild,
    /// Guild direct message.
    Dm,
    /// Group chat.
    Group,
    /// One-to-one chat.
    C2c,
}

impl Scene {
    fn bit(self) -> u8 {
        match self {
            Self::Guild => 1,
            Self::Dm => 1 << 1,
            Self::Group => 1 << 2,
            Self::C2c => 1 << 3,
        }
    }
}

/// Set of scenes a command or preprocessor is valid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenes(u8);

impl Scenes {
    pub const GUILD: Self = Self(1);
    pub const DM: Self = Self(1 << 1);
    pub const GROUP: Self = Self(1 << 2);
    pub const C2C: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    /// No scenes.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether `scene` is in the set.
    pub fn contains(self, scene: Scene) -> bool {
        self.0 & scene.bit() != 0
    }

    /// Whether the two sets share a scene.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// The scenes in the set.
    pub fn iter(self) -> impl Iterator<Item = Scene> {
        [Scene::Guild, Scene::Dm, Scene::Group, Scene::C2c]
            .into_iter()
            .filter(move |s| self.contains(*s))
    }
}

impl Default for Scenes {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<Scene> for Scenes {
    fn from(scene: Scene) -> Self {
        Self(scene.bit())
    }
}

impl BitOr for Scenes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Key-space a piece of session state lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Guild,
    Channel,
    Group,
    Global,
}

impl Scope {
    /// Every scope, in table order.
    pub const ALL: [Scope; 5] = [
        Scope::User,
        Scope::Guild,
        Scope::Channel,
        Scope::Group,
        Scope::Global,
    ];

    /// Whether records in this scope are keyed by an identity.
    pub fn has_identity(self) -> bool {
        !matches!(self, Self::Global)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Group => "group",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
