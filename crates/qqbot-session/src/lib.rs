//! Scoped ephemeral state for qqbot handlers.
//!
//! [`SessionManager`] keeps a `scope → identity → key → record` table whose
//! records expire after a configurable idle timeout and are collected some
//! time after going inactive. A background sweep drives those transitions and
//! commits the table to a snapshot file so state survives restarts.
//!
//! [`WaitForTable`] holds one-shot "next matching message" registrations; the
//! dispatcher fills them and handler code awaits them.

pub mod error;
pub mod manager;
pub mod record;
pub mod snapshot;
pub mod waitfor;

pub use error::{SessionError, WaitForError};
pub use manager::{SessionManager, SessionOptions, SessionTable, SweepReport};
pub use record::{SessionRecord, SessionStatus, TimeoutReply};
pub use snapshot::SnapshotStore;
pub use waitfor::{FillOutcome, WaitForTable, WaitKey, WaitRegistration};

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
