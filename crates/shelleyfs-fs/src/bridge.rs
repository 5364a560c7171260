//! Bridges `fuser::Filesystem`'s synchronous dispatch threads into the async
//! `BackendClient`.
//!
//! `fuser` calls into node methods from its own pool of worker threads.
//! Calling `Handle::block_on` directly from
//! one of those threads is fine *unless* that thread happens to be a tokio
//! worker thread already, which panics. Spawning a bare `std::thread` and
//! blocking the runtime handle from there sidesteps that entirely, the same
//! way `GrpcRemoteDao::create` bridges a sync DAO call to an async tonic
//! client.

use std::future::Future;

use tokio::runtime::Handle;

use crate::error::FsError;

/// Runs `fut` to completion on a fresh OS thread that blocks on `handle`,
/// then joins that thread and returns its result.
///
/// A panic inside `fut` (or a runtime shutdown mid-call) surfaces as
/// [`FsError::Interrupted`] rather than propagating the panic, since fuser's
/// dispatch thread must not go down with it.
pub fn run_blocking<F, T>(handle: &Handle, fut: F) -> Result<T, FsError>
where
    F: Future<Output = Result<T, FsError>> + Send + 'static,
    T: Send + 'static,
{
    let handle = handle.clone();
    std::thread::spawn(move || handle.block_on(fut))
        .join()
        .unwrap_or_else(|_| Err(FsError::Interrupted))
}
