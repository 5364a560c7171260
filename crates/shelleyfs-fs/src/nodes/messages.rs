//! `conversation/{id}/messages/`.

use std::sync::Arc;

use shelleyfs_common::{ConversationRecord, format_json, format_markdown, message_file_base, message_slug};

use crate::backend_ops::fetch_bundle;
use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, HandleState, Node, NodeKind};
use crate::time::{NodeTime, conversation_time, from_chrono};

use super::message_dir::MessageDirNode;
use super::query::{QueryLastContainerNode, QuerySinceContainerNode};

fn record_or_not_found(ctx: &FsContext, local_id: &str) -> Result<ConversationRecord, FsError> {
    ctx.store.get(local_id).ok_or(FsError::NotFound)
}

fn record_time(record: &ConversationRecord) -> NodeTime {
    conversation_time(&record.api_created_at, &record.api_updated_at, from_chrono(record.created_at))
}

pub struct MessagesDirNode {
    local_id: String,
}

impl MessagesDirNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for MessagesDirNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("msgs-dir").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        Ok(Attr::dir(record_time(&record)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let time = record_time(&record);
        let key = |tag: &'static str| InodeKey::new(tag).with_conversation(&self.local_id);

        match name {
            "all.json" => Ok(Arc::new(AllJsonNode::new(self.local_id.clone()))),
            "all.md" => Ok(Arc::new(AllMdNode::new(self.local_id.clone()))),
            "count" => {
                let count = fetch_bundle(ctx, &record)?.messages.len();
                Ok(Arc::new(super::static_file::StaticFileNode::new(
                    format!("{count}\n"),
                    0o444,
                    time,
                    key("msgs-count"),
                )))
            }
            "last" => Ok(Arc::new(QueryLastContainerNode::new(self.local_id.clone()))),
            "since" => Ok(Arc::new(QuerySinceContainerNode::new(self.local_id.clone()))),
            _ => {
                let bundle = fetch_bundle(ctx, &record)?;
                let msg = bundle
                    .messages
                    .iter()
                    .find(|m| {
                        let slug = message_slug(m, &bundle.tool_map);
                        message_file_base(m.sequence_id, &slug, bundle.max_sequence_id) == name
                    })
                    .ok_or(FsError::NotFound)?;
                Ok(Arc::new(MessageDirNode::new(self.local_id.clone(), msg.sequence_id)))
            }
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let key = |tag: &'static str| InodeKey::new(tag).with_conversation(&self.local_id);

        let mut entries = vec![
            DirEntry::new("all.json", ctx.inodes.get_or_assign(key("msgs-all-json")), NodeKind::File),
            DirEntry::new("all.md", ctx.inodes.get_or_assign(key("msgs-all-md")), NodeKind::File),
            DirEntry::new("count", ctx.inodes.get_or_assign(key("msgs-count")), NodeKind::File),
            DirEntry::new("last", ctx.inodes.get_or_assign(key("msgs-last")), NodeKind::Dir),
            DirEntry::new("since", ctx.inodes.get_or_assign(key("msgs-since")), NodeKind::Dir),
        ];

        for msg in &bundle.messages {
            let slug = message_slug(msg, &bundle.tool_map);
            let base = message_file_base(msg.sequence_id, &slug, bundle.max_sequence_id);
            let ino = ctx.inodes.get_or_assign(
                InodeKey::new("msg-dir")
                    .with_conversation(&self.local_id)
                    .with_sequence(msg.sequence_id),
            );
            entries.push(DirEntry::new(base, ino, NodeKind::Dir));
        }

        Ok(entries)
    }
}

/// `all.json`: a whole-conversation snapshot fixed at Open time.
pub struct AllJsonNode {
    local_id: String,
}

impl AllJsonNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for AllJsonNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("msgs-all-json").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let body = format_json(&bundle.messages).map_err(|e| FsError::Io(e.to_string()))?;
        Ok(Attr::file_with_perm(body.len() as u64, 0o444, record_time(&record)))
    }

    fn open(&self, ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Err(FsError::PermissionDenied);
        }
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let body = format_json(&bundle.messages).map_err(|e| FsError::Io(e.to_string()))?;
        Ok(HandleState::ReadBuffer(Arc::new(body.into_bytes())))
    }
}

/// `all.md`: Markdown rendering of the whole conversation.
pub struct AllMdNode {
    local_id: String,
}

impl AllMdNode {
    #[must_use]
    pub fn new(local_id: String) -> Self {
        Self { local_id }
    }
}

impl Node for AllMdNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("msgs-all-md").with_conversation(&self.local_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let body = format_markdown(&bundle.messages, &bundle.tool_map);
        Ok(Attr::file_with_perm(body.len() as u64, 0o444, record_time(&record)))
    }

    fn open(&self, ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Err(FsError::PermissionDenied);
        }
        let record = record_or_not_found(ctx, &self.local_id)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let body = format_markdown(&bundle.messages, &bundle.tool_map);
        Ok(HandleState::ReadBuffer(Arc::new(body.into_bytes())))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::nodes::test_support::{MockBackendClient, test_ctx};

    const TWO_MESSAGES: &str = r#"{"messages": [
        {"message_id": "m1", "conversation_id": "c1", "sequence_id": 1, "type": "user",
         "created_at": "2026-01-01T00:00:00Z", "user_data": {"content": "hi"}},
        {"message_id": "m2", "conversation_id": "c1", "sequence_id": 2, "type": "agent",
         "created_at": "2026-01-01T00:01:00Z", "llm_data": {"content": [{"type": "text", "text": "hey"}]}}
    ]}"#;

    fn seeded() -> (FsContext, tempfile::TempDir, String) {
        let client = MockBackendClient::new();
        client.set_conversation("shelley-1", TWO_MESSAGES);
        let (ctx, dir) = test_ctx(client);
        let local_id = ctx.store.clone_conversation().unwrap();
        ctx.store.mark_created(&local_id, "shelley-1", None).unwrap();
        (ctx, dir, local_id)
    }

    #[tokio::test]
    async fn readdir_lists_all_json_all_md_count_and_each_message() {
        let (ctx, _dir, local_id) = seeded();
        let node = MessagesDirNode::new(local_id);
        let entries = node.readdir(&ctx).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"all.json"));
        assert!(names.contains(&"all.md"));
        assert!(names.contains(&"count"));
        assert!(names.contains(&"last"));
        assert!(names.contains(&"since"));
        assert!(names.iter().any(|n| n.ends_with("-user")));
        assert!(names.iter().any(|n| n.ends_with("-agent")));
    }

    #[tokio::test]
    async fn lookup_count_reports_message_total() {
        let (ctx, _dir, local_id) = seeded();
        let node = MessagesDirNode::new(local_id);
        let count_node = node.lookup(&ctx, "count").unwrap();
        let HandleState::ReadBuffer(_) = count_node.open(&ctx, false).unwrap() else {
            panic!("expected a read buffer");
        };
        assert_eq!(count_node.getattr(&ctx).unwrap().size, 2);
    }

    #[tokio::test]
    async fn lookup_unknown_message_base_is_not_found() {
        let (ctx, _dir, local_id) = seeded();
        let node = MessagesDirNode::new(local_id);
        assert!(matches!(node.lookup(&ctx, "99-bogus"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn all_json_contains_both_messages() {
        let (ctx, _dir, local_id) = seeded();
        let node = AllJsonNode::new(local_id);
        let HandleState::ReadBuffer(buf) = node.open(&ctx, false).unwrap() else {
            panic!("expected a read buffer");
        };
        let text = String::from_utf8(buf.to_vec()).unwrap();
        assert!(text.contains("\"m1\""));
        assert!(text.contains("\"m2\""));
    }

    #[tokio::test]
    async fn all_md_write_open_is_rejected() {
        let (ctx, _dir, local_id) = seeded();
        let node = AllMdNode::new(local_id);
        assert!(matches!(node.open(&ctx, true), Err(FsError::PermissionDenied)));
    }
}
