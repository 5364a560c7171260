//! Errors at the filesystem boundary, mapped onto FUSE errno values.

use thiserror::Error;

/// An error surfaced by a node operation, already classified into one of a
/// small set of errno buckets.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("interrupted")]
    Interrupted,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FsError {
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::PermissionDenied => libc::EACCES,
            Self::Io(_) => libc::EIO,
            Self::Interrupted => libc::EINTR,
            Self::InvalidArgument(_) => libc::EINVAL,
        }
    }
}

impl From<shelleyfs_client::BackendError> for FsError {
    fn from(e: shelleyfs_client::BackendError) -> Self {
        match e {
            shelleyfs_client::BackendError::NotFound => Self::NotFound,
            shelleyfs_client::BackendError::Timeout => Self::Io("backend call timed out".into()),
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<shelleyfs_store::StoreError> for FsError {
    fn from(e: shelleyfs_store::StoreError) -> Self {
        match e {
            shelleyfs_store::StoreError::NotFound(_) => Self::NotFound,
            shelleyfs_store::StoreError::ReadOnly => Self::PermissionDenied,
            other => Self::Io(other.to_string()),
        }
    }
}

impl From<shelleyfs_cache::CacheError> for FsError {
    fn from(e: shelleyfs_cache::CacheError) -> Self {
        Self::Io(e.to_string())
    }
}
