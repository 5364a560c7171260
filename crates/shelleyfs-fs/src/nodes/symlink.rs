//! The generic symlink leaf.

use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, Node};
use crate::time::NodeTime;

pub struct SymlinkNode {
    target: String,
    time: NodeTime,
    key: InodeKey,
}

impl SymlinkNode {
    /// `key` must match the identity the parent directory's `Readdir` uses
    /// for this same entry, so repeated Lookups and a Readdir agree on the
    /// inode number.
    #[must_use]
    pub fn new(target: impl Into<String>, time: NodeTime, key: InodeKey) -> Self {
        Self { target: target.into(), time, key }
    }
}

impl Node for SymlinkNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        self.key.clone()
    }

    fn getattr(&self, _ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::symlink(self.target.len() as u64, self.time))
    }

    fn readlink(&self, _ctx: &FsContext) -> Result<String, FsError> {
        Ok(self.target.clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::nodes::test_support::{MockBackendClient, test_ctx};

    #[tokio::test]
    async fn readlink_returns_the_target_and_size_matches_target_length() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let node = SymlinkNode::new("../../model/opus", NodeTime::uniform(ctx.start_time), InodeKey::new("t"));
        assert_eq!(node.readlink(&ctx).unwrap(), "../../model/opus");
        assert_eq!(node.getattr(&ctx).unwrap().size, "../../model/opus".len() as u64);
    }
}
