//! `conversation/` and `conversation/last/`.

use std::sync::Arc;

use shelleyfs_common::ConversationRecord;

use crate::backend_ops::fetch_conversation_summaries;
use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, Node, NodeKind};
use crate::ranking::{nth_most_recent, rank_most_recent};
use crate::time::NodeTime;

use super::conversation::ConversationDirNode;
use super::symlink::SymlinkNode;

/// Records visible in `conversation/` after the sweep and the
/// stale-tolerant backend-presence filter.
fn visible_records(ctx: &FsContext) -> Result<Vec<ConversationRecord>, FsError> {
    ctx.store.sweep(ctx.clone_timeout)?;
    let mut records: Vec<_> = ctx.store.list().into_iter().filter(|r| r.created).collect();

    if let Ok(summaries) = fetch_conversation_summaries(ctx) {
        let live: std::collections::HashSet<_> = summaries.iter().map(|s| s.shelley_id.as_str()).collect();
        records.retain(|r| live.contains(r.shelley_id.as_str()));
    }
    // Backend call failed: degrade by keeping every locally known record.

    Ok(records)
}

pub struct ConversationListNode;

impl ConversationListNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConversationListNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ConversationListNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("root-conversation")
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        if name == "last" {
            return Ok(Arc::new(ConversationLastNode::new()));
        }

        if let Some(record) = ctx.store.get(name) {
            if record.created {
                return Ok(Arc::new(ConversationDirNode::new(record.local_id)));
            }
        }

        let records = ctx.store.list();
        if let Some(record) = records.iter().find(|r| r.created && r.shelley_id == name) {
            return Ok(Arc::new(SymlinkNode::new(
                record.local_id.clone(),
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("conversation-shelley-alias").with_conversation(&record.local_id),
            )));
        }
        if let Some(record) = records.iter().find(|r| r.created && !r.slug.is_empty() && r.slug == name) {
            return Ok(Arc::new(SymlinkNode::new(
                record.local_id.clone(),
                NodeTime::uniform(ctx.start_time),
                InodeKey::new("conversation-slug-alias").with_conversation(&record.local_id),
            )));
        }

        let summaries = fetch_conversation_summaries(ctx)?;
        let summary = summaries.into_iter().find(|s| s.shelley_id == name).ok_or(FsError::NotFound)?;

        let local_id = ctx.store.adopt(
            &summary.shelley_id,
            summary.slug,
            summary.api_created_at,
            summary.api_updated_at,
        )?;
        Ok(Arc::new(ConversationDirNode::new(local_id)))
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let records = visible_records(ctx)?;
        let mut entries = Vec::new();

        for record in &records {
            let dir_ino = ctx
                .inodes
                .get_or_assign(InodeKey::new("conversation-dir").with_conversation(&record.local_id));
            entries.push(DirEntry::new(record.local_id.clone(), dir_ino, NodeKind::Dir));

            if !record.shelley_id.is_empty() {
                let ino = ctx.inodes.get_or_assign(
                    InodeKey::new("conversation-shelley-alias").with_conversation(&record.local_id),
                );
                entries.push(DirEntry::new(record.shelley_id.clone(), ino, NodeKind::Symlink));
            }

            if !record.slug.is_empty() {
                let ino = ctx.inodes.get_or_assign(
                    InodeKey::new("conversation-slug-alias").with_conversation(&record.local_id),
                );
                entries.push(DirEntry::new(record.slug.clone(), ino, NodeKind::Symlink));
            }
        }

        let last_ino = ctx.inodes.get_or_assign(InodeKey::new("conversation-last"));
        entries.push(DirEntry::new("last", last_ino, NodeKind::Dir));

        Ok(entries)
    }

    fn rmdir(&self, ctx: &FsContext, name: &str) -> Result<(), FsError> {
        let record = ctx.store.get(name).ok_or(FsError::NotFound)?;

        if record.created {
            let client = Arc::clone(&ctx.client);
            let shelley_id = record.shelley_id.clone();
            crate::bridge::run_blocking(&ctx.runtime, async move {
                client.delete_conversation(&shelley_id).await.map_err(FsError::from)
            })?;
        }

        ctx.store.delete(name)?;
        Ok(())
    }
}

/// `conversation/last/N`.
pub struct ConversationLastNode;

impl ConversationLastNode {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConversationLastNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for ConversationLastNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("conversation-last")
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        Ok(Attr::dir(NodeTime::uniform(ctx.start_time)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let n: usize = name.parse().map_err(|_| FsError::NotFound)?;
        let records = rank_most_recent(visible_records(ctx)?);
        let record = nth_most_recent(&records, n).ok_or(FsError::NotFound)?;
        Ok(Arc::new(SymlinkNode::new(
            format!("../{}", record.local_id),
            NodeTime::uniform(ctx.start_time),
            InodeKey::new("conversation-last-n").with_sequence(n as u64),
        )))
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let count = visible_records(ctx)?.len();
        Ok((1..=count)
            .map(|n| {
                let ino = ctx
                    .inodes
                    .get_or_assign(InodeKey::new("conversation-last-n").with_sequence(n as u64));
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
    async fn lookup_by_local_id_resolves_created_records() {
        let client = MockBackendClient::new();
        *client.conversations.lock().unwrap() =
            br#"{"conversations": [{"shelley_id": "shelley-1"}]}"#.to_vec();
        let (ctx, _dir) = test_ctx(client);
        let local_id = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&local_id, "shelley-1", None).unwrap();

        let node = ConversationListNode::new();
        assert!(node.lookup(&ctx, &local_id).is_ok());
    }

    #[tokio::test]
    async fn lookup_by_shelley_id_resolves_to_an_alias_symlink() {
        let client = MockBackendClient::new();
        *client.conversations.lock().unwrap() =
            br#"{"conversations": [{"shelley_id": "shelley-1"}]}"#.to_vec();
        let (ctx, _dir) = test_ctx(client);
        let local_id = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&local_id, "shelley-1", None).unwrap();

        let node = ConversationListNode::new();
        let alias = node.lookup(&ctx, "shelley-1").unwrap();
        assert_eq!(alias.readlink(&ctx).unwrap(), local_id);
    }

    #[tokio::test]
    async fn unknown_name_with_no_matching_backend_summary_is_not_found() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let node = ConversationListNode::new();
        assert!(matches!(node.lookup(&ctx, "nope"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn readdir_degrades_to_local_records_when_backend_list_fails() {
        let client = MockBackendClient::new();
        client.fail_conversations.store(true, std::sync::atomic::Ordering::SeqCst);
        let (ctx, _dir) = test_ctx(client);
        let local_id = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&local_id, "shelley-1", None).unwrap();

        let node = ConversationListNode::new();
        let entries = node.readdir(&ctx).unwrap();
        assert!(entries.iter().any(|e| e.name == local_id));
    }

    #[tokio::test]
    async fn readdir_filters_out_records_the_backend_no_longer_lists() {
        let client = MockBackendClient::new();
        // Backend reports no conversations at all.
        let (ctx, _dir) = test_ctx(client);
        let local_id = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&local_id, "shelley-stale", None).unwrap();

        let node = ConversationListNode::new();
        let entries = node.readdir(&ctx).unwrap();
        assert!(!entries.iter().any(|e| e.name == local_id));
    }

    #[tokio::test]
    async fn rmdir_deletes_the_local_record() {
        let (ctx, _dir) = test_ctx(MockBackendClient::new());
        let local_id = ctx.store.clone_conversation().unwrap();

        let node = ConversationListNode::new();
        node.rmdir(&ctx, &local_id).unwrap();
        assert!(ctx.store.get(&local_id).is_none());
    }
}
