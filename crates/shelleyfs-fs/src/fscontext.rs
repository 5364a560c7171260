//! The shared, mount-lifetime state every node operation reaches through.
//! Global state exists only at the top of the tree.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use shelleyfs_cache::ParsedCache;
use shelleyfs_client::BackendClient;
use shelleyfs_store::LocalStore;
use tokio::runtime::Handle;

use crate::inode::InodeTable;
use crate::node::Node;

/// Constructed once at mount time and handed to every node by reference.
/// Never torn down until unmount; no lazy initialization.
pub struct FsContext {
    pub store: Arc<LocalStore>,
    pub client: Arc<dyn BackendClient>,
    pub parsed_cache: Arc<ParsedCache>,
    pub inodes: Arc<InodeTable>,
    pub registry: Arc<DashMap<u64, Arc<dyn Node>>>,
    /// Child inode -> parent inode, populated on `Lookup`, used only to
    /// answer `..` in `Readdir`.
    pub parents: Arc<DashMap<u64, u64>>,
    pub runtime: Handle,
    /// Filesystem mount time, the fallback for every timestamp chain that
    /// bottoms out with no domain time available.
    pub start_time: SystemTime,
    /// How long an `ALLOCATED` (uncreated) record survives before `sweep`
    /// removes it.
    pub clone_timeout: Duration,
    /// Per-call backend timeout.
    pub call_timeout: Duration,
}

impl FsContext {
    pub fn register(&self, ino: u64, node: Arc<dyn Node>) {
        self.registry.insert(ino, node);
    }
}
