//! The filesystem root.

use std::sync::Arc;

use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, Node, NodeKind};
use crate::ranking::{nth_most_recent, rank_most_recent};
use crate::time::NodeTime;

use super::conversation_list::ConversationListNode;
use super::model::ModelTreeNode;
use super::static_file::StaticFileNode;
use super::symlink::SymlinkNode;

const README: &str = include_str!("../../README_CONTENT.md");

pub struct RootNode;

impl RootNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for RootNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for RootNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("root")
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        match name {
            "README.md" => Ok(Arc::new(StaticFileNode::new(
                README.as_bytes().to_vec(),
                0o444,
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("root-readme"),
            ))),
            "model" => Ok(Arc::new(ModelTreeNode::new())),
            "conversation" => Ok(Arc::new(ConversationListNode::new())),
            "new" => Ok(Arc::new(SymlinkNode::new(
                "model/default/new",
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("root-new"),
            ))),
            "last" => Ok(Arc::new(RootLastNode::new())),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let readme = ctx.inodes.get_or_assign(InodeKey::new("root-readme"));
        let model = ctx.inodes.get_or_assign(InodeKey::new("model-tree"));
        let conversation = ctx.inodes.get_or_assign(InodeKey::new("root-conversation"));
        let new = ctx.inodes.get_or_assign(InodeKey::new("root-new"));
        let last = ctx.inodes.get_or_assign(InodeKey::new("root-last"));
        Ok(vec![
            DirEntry::new("README.md", readme, NodeKind::File),
            DirEntry::new("model", model, NodeKind::Dir),
            DirEntry::new("conversation", conversation, NodeKind::Dir),
            DirEntry::new("new", new, NodeKind::Symlink),
            DirEntry::new("last", last, NodeKind::Dir),
        ])
    }
}

/// Root-level `last/` container: `last/N` is a symlink into
/// `conversation/{local_id}` of the Nth-most-recent created conversation.
pub struct RootLastNode;

impl RootLastNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for RootLastNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for RootLastNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("root-last")
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let n: usize = name.parse().map_err(|_| FsError::NotFound)?;
        if n == 0 {
            return Err(FsError::NotFound);
        }
        let records = rank_most_recent(ctx.store.list().into_iter().filter(|r| r.created).collect());
        let record = nth_most_recent(&records, n).ok_or(FsError::NotFound)?;
        Ok(Arc::new(SymlinkNode::new(
            format!("conversation/{}", record.local_id),
            NodeTime::uniform(ctx.start_time),
            InodeKey::new("root-last-n").with_sequence(n as u64),
        )))
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let count = ctx.store.list().iter().filter(|r| r.created).count();
        Ok((1..=count)
            .map(|n| {
                let ino = ctx
                    .inodes
                    .get_or_assign(InodeKey::new("root-last-n").with_sequence(n as u64));
                DirEntry::new(n.to_string(), ino, NodeKind::Symlink)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::nodes::test_support::{MockBackendClient, test_ctx};

    #[tokio::test]
    async fn lookup_new_resolves_to_default_model_clone_symlink() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let node = RootNode::new();
        let target = node.lookup(&ctx, "new").unwrap().readlink(&ctx).unwrap();
        assert_eq!(target, "model/default/new");
    }

    #[tokio::test]
    async fn lookup_unknown_name_is_not_found() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let node = RootNode::new();
        assert!(matches!(node.lookup(&ctx, "bogus"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn root_last_lists_one_entry_per_created_conversation() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let uncreated = ctx.store.clone_conversation().unwrap();
        let created = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&created, "shelley-1", None).unwrap();

        let node = RootLastNode::new();
        let entries = node.readdir(&ctx).unwrap();
        assert_eq!(entries.len(), 1, "only created conversations are ranked");

        let target = node.lookup(&ctx, "1").unwrap().readlink(&ctx).unwrap();
        assert_eq!(target, format!("conversation/{created}"));
        assert!(!target.contains(&uncreated));
    }

    #[tokio::test]
    async fn root_last_zero_is_not_found() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let node = RootLastNode::new();
        assert!(matches!(node.lookup(&ctx, "0"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn readdir_inodes_agree_with_lookup_for_every_entry() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let node = RootNode::new();
        for entry in node.readdir(&ctx).unwrap() {
            let looked_up = node.lookup(&ctx, &entry.name).unwrap();
            let looked_up_ino = ctx.inodes.get_or_assign(looked_up.inode_key(&ctx));
            assert_eq!(
                entry.ino, looked_up_ino,
                "readdir and lookup disagree on the inode for {:?}",
                entry.name
            );
        }
    }
}
