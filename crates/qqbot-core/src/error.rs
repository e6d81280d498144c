//! Error types for qqbot core.

use std::path::PathBuf;
use thiserror::Error;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from decoding wire data or loading configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A gateway frame that is not a valid `{op, d, s, t}` envelope.
    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}

/// Problems with the bot configuration file.
///
/// [`ConfigError::Credentials`] is the one kind the runtime treats as fatal
/// at start-up; the rest surface from the CLI.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("JSON5 parse error: {0}")]
    Json5(String),

    #[error("Serialize error: {0}")]
    Parse(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Whether this error means the bot cannot authenticate at all.
    pub fn is_credentials(&self) -> bool {
        matches!(self, Self::Credentials(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_from_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{op:")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Frame(_)));
        assert!(err.to_string().starts_with("Malformed frame"));
    }

    #[test]
    fn test_credentials_kind() {
        assert!(ConfigError::Credentials("app_id is empty".into()).is_credentials());
        assert!(!ConfigError::Validation("bad".into()).is_credentials());
    }
}
