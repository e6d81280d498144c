//! Gateway client for qqbot.
//!
//! [`GatewayConnection`] owns one shard's socket: HELLO, IDENTIFY or RESUME,
//! heartbeats, the idle watchdog and the reconnect policy. Decoded dispatch
//! frames are de-duplicated by sequence number and handed to a shared
//! [`DispatchEngine`](qqbot_dispatch::DispatchEngine). [`Bot`] ties the REST
//! client, session table, engine and shards together.

pub mod bot;
pub mod connection;
pub mod dedup;
pub mod error;
mod heartbeat;
pub mod state;
pub mod transport;

pub use bot::Bot;
pub use connection::GatewayConnection;
pub use dedup::SequenceDedupCache;
pub use error::GatewayError;
pub use state::{ConnectionState, GatewaySession};
pub use transport::Transport;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
