//! REST client for the qqbot open API.
//!
//! The gateway runtime only needs a handful of endpoints: bot identity,
//! gateway discovery, and the four send-message calls. They sit behind the
//! [`BotApi`] trait so tests and alternate transports can substitute their own.

pub mod client;
pub mod error;
pub mod gate;
pub mod http;
pub mod token;

pub use client::{BotApi, BotInfo, GatewayInfo, SentMessage, SessionStartLimit};
pub use error::ApiError;
pub use gate::AdmissionGate;
pub use http::HttpApi;
pub use token::{Credential, TokenSource};

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
