//! Gateway error types.

use qqbot_api::ApiError;
use qqbot_core::ConfigError;
use thiserror::Error;

/// Errors from the gateway connection and bot runner.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unusable configuration or credentials; the bot cannot run.
    #[error("fatal: {0}")]
    Fatal(String),

    /// REST call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Socket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame payload did not decode.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The connection was stopped.
    #[error("connection closed")]
    Closed,
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        Self::Fatal(e.to_string())
    }
}

impl GatewayError {
    /// Whether reconnecting cannot help.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal(_) => true,
            Self::Api(e) => e.is_fatal(),
            _ => false,
        }
    }
}
