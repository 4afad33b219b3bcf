//! Error taxonomy for the sync layer.
//!
//! Transport failures reject every affected caller uniformly with
//! [`SyncError::Closed`]; backend-reported errors reach exactly the call
//! site that triggered them; codec failures never propagate past the
//! frame that produced them.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// The connection dropped while the call was pending or queued.
    #[error("connection closed")]
    Closed,

    /// Invoked without a connection and no connect in progress.
    #[error("not connected to backend")]
    NotConnected,

    /// The initial socket handshake failed.
    #[error("failed to reach backend: {0}")]
    Connect(String),

    /// The backend answered with an explicit error string.
    #[error("backend error: {0}")]
    Backend(String),

    /// A payload or envelope failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// A queued task was discarded by a reset before it started.
    #[error("task cancelled before start")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SyncError>;
