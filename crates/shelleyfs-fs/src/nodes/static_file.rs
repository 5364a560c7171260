//! Static read-only leaves: `README.md`, `model/{m}/id`, `model/{m}/ready`,
//! `model/{m}/new/start`.

use std::sync::Arc;

use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, HandleState, Node};
use crate::time::NodeTime;

pub struct StaticFileNode {
    content: Arc<Vec<u8>>,
    perm: u16,
    time: NodeTime,
    key: InodeKey,
}

impl StaticFileNode {
    /// `key` must match the identity the parent directory's `Readdir` uses
    /// for this same entry.
    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>, perm: u16, time: NodeTime, key: InodeKey) -> Self {
        Self { content: Arc::new(content.into()), perm, time, key }
    }
}

impl Node for StaticFileNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        self.key.clone()
    }

    fn getattr(&self, _ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::file_with_perm(self.content.len() as u64, self.perm, self.time))
    }

    fn open(&self, _ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Err(FsError::PermissionDenied);
        }
        Ok(HandleState::ReadBuffer(Arc::clone(&self.content)))
    }
}
