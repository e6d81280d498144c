//! The transport seam the bot runner drives.

use crate::state::ConnectionState;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A long-lived connection that feeds frames to a dispatch engine.
pub trait Transport: Send + Sync {
    /// Spawn the connect/reconnect loop. The handle resolves once the
    /// transport is stopped or hits a fatal error.
    fn start(self: Arc<Self>) -> JoinHandle<Result<()>>;

    /// Drop the current socket; the reconnect policy decides what follows.
    fn close(&self);

    /// Close for good.
    fn stop(&self);

    /// Forget the session and reconnect with a fresh IDENTIFY.
    fn force_reset(&self);

    fn state(&self) -> ConnectionState;
}
