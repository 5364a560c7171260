//! `messages/last/` and `messages/since/` query subtrees.

use std::sync::{Arc, Mutex};

use shelleyfs_common::{ConversationRecord, filter_last, filter_since, message_file_base, message_slug};

use crate::backend_ops::fetch_bundle;
use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, Node, NodeKind};
use crate::time::{NodeTime, conversation_time, from_chrono};

use super::symlink::SymlinkNode;

fn record_or_not_found(ctx: &FsContext, local_id: &str) -> Result<ConversationRecord, FsError> {
    ctx.store.get(local_id).ok_or(FsError::NotFound)
}

fn record_time(record: &ConversationRecord) -> NodeTime {
    conversation_time(&record.api_created_at, &record.api_updated_at, from_chrono(record.created_at))
}

/// A query-result node's cached filtered snapshot, valid only while the
/// `ParsedBundle` it was computed from remains the one L1 currently holds,
/// judged by pointer identity of the backing raw slice.
struct Snapshot {
    raw: Arc<Vec<u8>>,
    bases: Vec<String>,
}

fn cached_or_compute(
    cache: &Mutex<Option<Snapshot>>,
    ctx: &FsContext,
    record: &ConversationRecord,
    compute: impl FnOnce(&[shelleyfs_common::Message], &shelleyfs_common::ToolMap, u64) -> Vec<String>,
) -> Result<Vec<String>, FsError> {
    let bundle = fetch_bundle(ctx, record)?;

    let mut guard = cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(snapshot) = guard.as_ref() {
        if Arc::ptr_eq(&snapshot.raw, &bundle.raw) {
            return Ok(snapshot.bases.clone());
        }
    }

    let bases = compute(&bundle.messages, &bundle.tool_map, bundle.max_sequence_id);
    *guard = Some(Snapshot { raw: Arc::clone(&bundle.raw), bases: bases.clone() });
    Ok(bases)
}

/// `messages/last/`: container directory, Getattr only, empty Readdir.
/// Children are synthesised on demand by `Lookup` of a decimal `N`.
pub struct QueryLastContainerNode {
    local_id: String,
}

impl QueryLastContainerNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for QueryLastContainerNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("msgs-last").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let n: usize = name.parse().map_err(|_| FsError::NotFound)?;
        if n == 0 {
            return Err(FsError::NotFound);
        }
        // Existence of the record is enough; an empty or short conversation
        // still yields a (possibly smaller) result directory.
        record_or_not_found(ctx, &self.local_id)?;
        Ok(Arc::new(QueryLastResultNode::new(self.local_id.clone(), n)))
    }
}

/// `messages/last/{N}/`: N symlinks named `0` (oldest) .. `N-1` (newest),
/// each targeting `../../{base}` of the corresponding message directory.
pub struct QueryLastResultNode {
    local_id: String,
    n: usize,
    cache: Mutex<Option<Snapshot>>,
}

impl QueryLastResultNode {
    #[must_use]
    pub fn new(local_id: String, n: usize) -> Self {
        Self { local_id, n, cache: Mutex::new(None) }
    }

    fn bases(&self, ctx: &FsContext, record: &ConversationRecord) -> Result<Vec<String>, FsError> {
        let n = self.n;
        cached_or_compute(&self.cache, ctx, record, |msgs, tool_map, max_sequence_id| {
            filter_last(msgs, n)
                .iter()
                .map(|m| message_file_base(m.sequence_id, &message_slug(m, tool_map), max_sequence_id))
                .collect()
        })
    }
}

impl Node for QueryLastResultNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("query-last-result").with_conversation(&self.local_id).with_sequence(self.n as u64)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let time = record_time(&record);
        let idx: usize = name.parse().map_err(|_| FsError::NotFound)?;
        let bases = self.bases(ctx, &record)?;
        let base = bases.get(idx).ok_or(FsError::NotFound)?;
        Ok(Arc::new(SymlinkNode::new(
            format!("../../{base}"),
            time,
            InodeKey::new("query-last-entry")
                .with_conversation(&self.local_id)
                .with_sequence(self.n as u64)
                .with_field(idx.to_string()),
        )))
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bases = self.bases(ctx, &record)?;
        Ok(bases
            .iter()
            .enumerate()
            .map(|(idx, _)| {
                let ino = ctx.inodes.get_or_assign(
                    InodeKey::new("query-last-entry")
                        .with_conversation(&self.local_id)
                        .with_sequence(self.n as u64)
                        .with_field(idx.to_string()),
                );
                DirEntry::new(idx.to_string(), ino, NodeKind::Symlink)
            })
            .collect())
    }
}

/// `messages/since/`: container directory, Getattr only, empty Readdir.
/// Children are synthesised on demand by `Lookup` of an actor slug.
pub struct QuerySinceContainerNode {
    local_id: String,
}

impl QuerySinceContainerNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for QuerySinceContainerNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("msgs-since").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        record_or_not_found(ctx, &self.local_id)?;
        Ok(Arc::new(QuerySinceActorNode::new(self.local_id.clone(), name.to_string())))
    }
}

/// `messages/since/{actor}/`: container directory, Getattr only, empty
/// Readdir. Children are synthesised on demand by `Lookup` of a decimal `N`.
pub struct QuerySinceActorNode {
    local_id: String,
    actor: String,
}

impl QuerySinceActorNode {
    #[must_use]
    pub fn new(local_id: String, actor: String) -> Self {
        Self { local_id, actor }
    }
}

impl Node for QuerySinceActorNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("query-since-actor").with_conversation(&self.local_id).with_field(&self.actor)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let n: usize = name.parse().map_err(|_| FsError::NotFound)?;
        if n == 0 {
            return Err(FsError::NotFound);
        }
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bundle = fetch_bundle(ctx, &record)?;
        // filter_since fails fast if fewer than N actor messages exist; that
        // maps directly onto "not found" for this child.
        filter_since(&bundle.messages, &self.actor, n, &bundle.tool_map).map_err(|_| FsError::NotFound)?;
        Ok(Arc::new(QuerySinceResultNode::new(self.local_id.clone(), self.actor.clone(), n)))
    }
}

/// `messages/since/{actor}/{N}/`: symlinks named `{base}` for every message
/// after the Nth-from-last message whose slug equals `actor`.
pub struct QuerySinceResultNode {
    local_id: String,
    actor: String,
    n: usize,
    cache: Mutex<Option<Snapshot>>,
}

impl QuerySinceResultNode {
    #[must_use]
    pub fn new(local_id: String, actor: String, n: usize) -> Self {
        Self { local_id, actor, n, cache: Mutex::new(None) }
    }

    fn bases(&self, ctx: &FsContext, record: &ConversationRecord) -> Result<Vec<String>, FsError> {
        let actor = self.actor.as_str();
        let n = self.n;
        cached_or_compute(&self.cache, ctx, record, |msgs, tool_map, max_sequence_id| {
            filter_since(msgs, actor, n, tool_map)
                .map(|tail| {
                    tail.iter()
                        .map(|m| message_file_base(m.sequence_id, &message_slug(m, tool_map), max_sequence_id))
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}

impl Node for QuerySinceResultNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("query-since-result")
            .with_conversation(&self.local_id)
            .with_sequence(self.n as u64)
            .with_field(&self.actor)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let time = record_time(&record);
        let bases = self.bases(ctx, &record)?;
        if !bases.iter().any(|b| b == name) {
            return Err(FsError::NotFound);
        }
        Ok(Arc::new(SymlinkNode::new(
            format!("../../../{name}"),
            time,
            InodeKey::new("query-since-entry")
                .with_conversation(&self.local_id)
                .with_sequence(self.n as u64)
                .with_field(format!("{}/{}", self.actor, name)),
        )))
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bases = self.bases(ctx, &record)?;
        Ok(bases
            .iter()
            .map(|base| {
                let ino = ctx.inodes.get_or_assign(
                    InodeKey::new("query-since-entry")
                        .with_conversation(&self.local_id)
                        .with_sequence(self.n as u64)
                        .with_field(format!("{}/{}", self.actor, base)),
                );
                DirEntry::new(base.clone(), ino, NodeKind::Symlink)
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
    use tempfile::TempDir;

    fn conversation_body() -> String {
        let mut messages = Vec::new();
        for (seq, ty, text) in [
            (1u64, "user", "hi"),
            (2, "agent", "hey"),
            (3, "user", "again"),
            (4, "agent", "ok"),
            (5, "user", "bye"),
        ] {
            messages.push(serde_json::json!({
                "message_id": format!("m{seq}"),
                "conversation_id": "conv1",
                "sequence_id": seq,
                "type": ty,
                "created_at": "2026-01-01T00:00:00Z",
                "user_data": if ty == "user" { Some(serde_json::json!({"content": text})) } else { None },
                "llm_data": if ty != "user" {
                    Some(serde_json::json!({"content": [{"type": "text", "text": text}]}))
                } else {
                    None
                },
            }));
        }
        serde_json::json!({ "messages": messages }).to_string()
    }

    /// Seeds a created conversation with the five-message fixture, wiring
    /// the mock's backing store before it's handed to `test_ctx`.
    fn seeded_ctx() -> (FsContext, TempDir, String) {
        let client = MockBackendClient::new();
        client.set_conversation("shelley-1", conversation_body());
        let (ctx, dir) = test_ctx(client);
        let local_id = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&local_id, "shelley-1", None).unwrap();
        (ctx, dir, local_id)
    }

    #[tokio::test]
    async fn last_container_lookup_rejects_zero_and_non_numeric() {
        let (ctx, _dir, local_id) = seeded_ctx();
        let node = QueryLastContainerNode::new(local_id);
        assert!(matches!(node.lookup(&ctx, "0"), Err(FsError::NotFound)));
        assert!(matches!(node.lookup(&ctx, "abc"), Err(FsError::NotFound)));
        assert!(node.lookup(&ctx, "2").is_ok());
    }

    #[tokio::test]
    async fn last_result_readdir_and_lookup_yield_oldest_first() {
        let (ctx, _dir, local_id) = seeded_ctx();
        let node = QueryLastResultNode::new(local_id, 2);

        let entries = node.readdir(&ctx).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "0");
        assert_eq!(entries[1].name, "1");

        // max_sequence_id = 5 -> width(4) = 1; messages 4 (agent) and 5
        // (user) are the last two, oldest first.
        let oldest = node.lookup(&ctx, "0").unwrap();
        assert!(oldest.readlink(&ctx).unwrap().ends_with("3-agent"));

        let newest = node.lookup(&ctx, "1").unwrap();
        assert!(newest.readlink(&ctx).unwrap().ends_with("4-user"));
    }

    #[tokio::test]
    async fn last_result_out_of_range_index_is_not_found() {
        let (ctx, _dir, local_id) = seeded_ctx();
        let node = QueryLastResultNode::new(local_id, 2);
        assert!(matches!(node.lookup(&ctx, "5"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn since_actor_resolves_tail_after_nth_match() {
        let (ctx, _dir, local_id) = seeded_ctx();
        let container = QuerySinceContainerNode::new(local_id.clone());
        let actor_node = container.lookup(&ctx, "user").unwrap();
        let result = actor_node.lookup(&ctx, "2");
        assert!(result.is_ok());

        let result_node = QuerySinceResultNode::new(local_id, "user".to_string(), 2);
        let entries = result_node.readdir(&ctx).unwrap();
        // Messages 4 and 5 follow the 2nd-from-last "user" message (seq 3).
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn since_actor_not_enough_matches_is_not_found() {
        let (ctx, _dir, local_id) = seeded_ctx();
        let container = QuerySinceContainerNode::new(local_id);
        let actor_node = container.lookup(&ctx, "user").unwrap();
        assert!(matches!(actor_node.lookup(&ctx, "10"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn snapshot_cache_reuses_result_for_unchanged_raw_bytes() {
        let (ctx, _dir, local_id) = seeded_ctx();
        let node = QueryLastResultNode::new(local_id, 1);
        let first = node.bases(&ctx, &ctx.store.get(&node.local_id).unwrap()).unwrap();
        let second = node.bases(&ctx, &ctx.store.get(&node.local_id).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
