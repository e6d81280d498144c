//! Session error types.

use qqbot_core::Scope;
use std::time::Duration;
use thiserror::Error;

/// Errors from the session table.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No record under that scope, identity and key.
    #[error("session not found: {scope}/{identity}/{key}")]
    NotFound {
        scope: Scope,
        identity: String,
        key: String,
    },

    /// The scope is keyed by identity but none was given.
    #[error("scope {0} requires an identity")]
    MissingIdentity(Scope),

    /// Snapshot read or write failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// Snapshot did not (de)serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from awaiting a wait-for registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitForError {
    /// No matching message arrived in time.
    #[error("no matching message within {0:?}")]
    Timeout(Duration),

    /// The registration vanished without being filled.
    #[error("wait-for registration not found")]
    NotFound,
}
