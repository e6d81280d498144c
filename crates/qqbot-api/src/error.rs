//! API error types.

use thiserror::Error;

/// Errors returned by the REST client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not decode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credentials were rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Too many requests.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Any other non-success status.
    #[error("API error {status} (code {code}): {message} [trace: {trace_id}]")]
    Status {
        /// HTTP status.
        status: u16,
        /// Platform error code.
        code: i64,
        /// Platform error message.
        message: String,
        /// Trace id header, for support requests.
        trace_id: String,
    },

    /// Credentials are missing or unusable.
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// The admission gate was closed.
    #[error("API client closed")]
    Closed,
}

impl ApiError {
    /// Whether retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Credentials(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ApiError::Unauthorized("bad token".into()).is_fatal());
        assert!(ApiError::Credentials("no secret".into()).is_fatal());
        assert!(!ApiError::RateLimited("slow down".into()).is_fatal());
        assert!(!ApiError::Closed.is_fatal());

        let err = ApiError::Status {
            status: 400,
            code: 304003,
            message: "url not allowed".into(),
            trace_id: "t-1".into(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("304003"));
    }
}
