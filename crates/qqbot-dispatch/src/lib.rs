//! Event routing and command matching for qqbot.
//!
//! A [`DispatchEngine`] receives decoded gateway frames and turns them into
//! handler calls. Message-class events pass through a fixed pipeline:
//!
//! 1. Message treatment (mention and `/` stripping, entity unescaping)
//! 2. Preprocessors, in registration order
//! 3. Pending wait-for registrations
//! 4. Commands: literal matchers first, then regex, each in registration order
//! 5. The fallback message handler, unless a command claimed the message
//!
//! Every other event is a direct lookup of one bound handler. Handler errors
//! and panics are caught and logged at the dispatch boundary.

pub mod command;
pub mod engine;
pub mod error;
pub mod handler;
pub mod registry;
pub mod treat;

pub use command::{CommandDescriptor, Preprocessor};
pub use engine::DispatchEngine;
pub use error::DispatchError;
pub use handler::{Context, EventHandler, Flow, MessageHandler, PreprocessHandler, StartHandler};
pub use registry::{Registry, RegistryHandle};
pub use treat::treat_msg;

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
