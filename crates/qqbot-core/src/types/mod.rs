//! Core types for qqbot.

mod event;
mod frame;
mod intents;
mod matcher;
mod message;
mod outbound;
mod scene;

pub use event::*;
pub use frame::*;
pub use intents::*;
pub use matcher::*;
pub use message::*;
pub use outbound::*;
pub use scene::*;
