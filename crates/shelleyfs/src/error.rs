//! Top-level errors for the `shelleyfs` binary: configuration, mount setup,
//! and the collaborators it wires together before handing off to FUSE.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("backend client error: {0}")]
    Backend(#[from] shelleyfs_client::BackendError),

    #[error("local store error: {0}")]
    Store(#[from] shelleyfs_store::StoreError),

    #[error("mount failed: {0}")]
    Mount(#[from] std::io::Error),

    #[error("no home directory found to locate the default state file")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, CliError>;
