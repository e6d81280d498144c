//! Dispatch error types.

use qqbot_api::ApiError;
use thiserror::Error;

/// Errors surfaced by the dispatcher and handler context.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Command pattern failed to compile.
    #[error("invalid command pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The message has nowhere to reply to.
    #[error("message {0} has no reply target")]
    NoReplyTarget(String),

    /// REST call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The engine owning the registry is gone.
    #[error("registry closed")]
    RegistryClosed,
}
