//! `shelleyfs`: mounts a remote conversation backend as a POSIX filesystem.

mod error;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::Parser;
use dashmap::DashMap;
use fuser::MountOption;
use shelleyfs_cache::ParsedCache;
use shelleyfs_client::HttpBackendClient;
use shelleyfs_fs::{FsContext, InodeTable, ShelleyFs};
use shelleyfs_store::LocalStore;
use tracing::{info, warn};

use crate::error::{CliError, Result};

fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to mount the filesystem at.
    mount_point: std::path::PathBuf,

    /// Base URL of the conversation backend.
    #[arg(long)]
    server: String,

    /// How long the response cache (L0) keeps a backend read.
    #[arg(long, value_parser = parse_duration, default_value = "2s")]
    cache_ttl: Duration,

    /// How long an uncreated conversation record survives before sweep.
    #[arg(long, value_parser = parse_duration, default_value = "10m")]
    clone_timeout: Duration,

    /// Per-call budget for a single backend request.
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    call_timeout: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    run(args).await.map_err(anyhow::Error::from)
}

async fn run(args: Args) -> Result<()> {
    info!(mount_point = %args.mount_point.display(), server = %args.server, "starting shelleyfs");

    let client = HttpBackendClient::new(args.server, args.cache_ttl, args.call_timeout)?;
    let store = LocalStore::open(&shelleyfs_store::data_dir().ok_or(CliError::NoHomeDir)?)?;

    let ctx = FsContext {
        store: Arc::new(store),
        client: Arc::new(client),
        parsed_cache: Arc::new(ParsedCache::new()),
        inodes: Arc::new(InodeTable::new()),
        registry: Arc::new(DashMap::new()),
        parents: Arc::new(DashMap::new()),
        runtime: tokio::runtime::Handle::current(),
        start_time: SystemTime::now(),
        clone_timeout: args.clone_timeout,
        call_timeout: args.call_timeout,
    };

    let fs = ShelleyFs::new(ctx);
    let options = vec![MountOption::FSName("shelleyfs".to_string()), MountOption::NoAtime];

    // `spawn_mount2` hosts the FUSE loop on its own thread pool; we just
    // wait here for a shutdown signal and drop the session to unmount,
    // mirroring the shutdown-signal pattern of a long-running accept loop.
    let session = fuser::spawn_mount2(fs, &args.mount_point, &options)?;

    wait_for_shutdown().await;
    info!("shutdown signal received, unmounting");
    drop(session);

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, falling back to ctrl_c only");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
