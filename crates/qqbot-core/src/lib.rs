//! # qqbot-core
//!
//! Core types, configuration, and utilities for qqbot.
//!
//! This crate provides shared functionality used across all qqbot crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the bot config file
//! - **Types**: Gateway frames, op codes, intents, typed events, and outbound payloads
//! - **Utilities**: Path resolution and secret handling

pub mod config;
pub mod error;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::BotConfig;
pub use error::{ConfigError, Error, Result};
pub use secret::SecretString;
pub use types::*;
