//! Errors raised by the local store.

use thiserror::Error;

/// Errors from [`crate::LocalStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem I/O failed. Surfaces as a generic I/O failure
    /// at the filesystem boundary.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted record file did not parse.
    #[error("store record file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// No record exists for the given local id.
    #[error("no such conversation: {0}")]
    NotFound(String),

    /// `set_ctl` was called on a record whose `created` flag is already true.
    #[error("conversation is read-only")]
    ReadOnly,

    /// Local id allocation could not find a free 8-hex id after repeated
    /// retries. Effectively unreachable at any realistic record count.
    #[error("could not allocate a unique local id")]
    IdSpaceExhausted,
}
