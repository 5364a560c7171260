//! Per-message directory: scalar leaves, `content.md`, and the recursive
//! `llm_data/`/`usage_data/` JSON trees.

use std::sync::Arc;

use serde_json::Value;
use shelleyfs_common::{Message, format_markdown};

use crate::backend_ops::fetch_bundle;
use crate::error::FsError;
use crate::fscontext::FsContext;
use crate::inode::InodeKey;
use crate::node::{Attr, DirEntry, HandleState, Node, NodeKind};
use crate::time::{NodeTime, parse_rfc3339};

use super::static_file::StaticFileNode;

fn message_time(ctx: &FsContext, msg: &Message) -> NodeTime {
    let t = parse_rfc3339(&msg.created_at).unwrap_or(ctx.start_time);
    NodeTime::uniform(t)
}

fn find_message<'a>(msgs: &'a [Message], sequence_id: u64) -> Result<&'a Message, FsError> {
    msgs.iter().find(|m| m.sequence_id == sequence_id).ok_or(FsError::NotFound)
}

pub struct MessageDirNode {
    local_id: String,
    sequence_id: u64,
}

impl MessageDirNode {
    #[must_use]
    pub fn new(local_id: String, sequence_id: u64) -> Self {
        Self { local_id, sequence_id }
    }
}

impl Node for MessageDirNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        InodeKey::new("msg-dir").with_conversation(&self.local_id).with_sequence(self.sequence_id)
    }

    fn getattr(&self, ctx: &FsContext) -> Result<Attr, FsError> {
        let record = ctx.store.get(&self.local_id).ok_or(FsError::NotFound)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let msg = find_message(&bundle.messages, self.sequence_id)?;
        Ok(Attr::dir(message_time(ctx, msg)))
    }

    fn lookup(&self, ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        let record = ctx.store.get(&self.local_id).ok_or(FsError::NotFound)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let msg = find_message(&bundle.messages, self.sequence_id)?;
        let time = message_time(ctx, msg);
        let key = |tag: &'static str| {
            InodeKey::new(tag).with_conversation(&self.local_id).with_sequence(self.sequence_id)
        };

        match name {
            "message_id" => Ok(leaf(&msg.message_id, time, key("msg-field-id"))),
            "conversation_id" => Ok(leaf(&msg.conversation_id, time, key("msg-field-conv"))),
            "sequence_id" => Ok(leaf(&msg.sequence_id.to_string(), time, key("msg-field-seq"))),
            "type" => Ok(leaf(msg.message_type.as_str(), time, key("msg-field-type"))),
            "created_at" => Ok(leaf(&msg.created_at, time, key("msg-field-created"))),
            "content.md" => {
                let body = format_markdown(std::slice::from_ref(msg), &bundle.tool_map);
                Ok(Arc::new(StaticFileNode::new(body, 0o444, time, key("msg-content-md"))))
            }
            "llm_data" => json_root(&self.local_id, self.sequence_id, "llm_data", &msg.llm_data, time),
            "usage_data" => json_root(&self.local_id, self.sequence_id, "usage_data", &msg.usage_data, time),
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        let record = ctx.store.get(&self.local_id).ok_or(FsError::NotFound)?;
        let bundle = fetch_bundle(ctx, &record)?;
        let msg = find_message(&bundle.messages, self.sequence_id)?;
        let key = |tag: &'static str| {
            InodeKey::new(tag).with_conversation(&self.local_id).with_sequence(self.sequence_id)
        };

        let mut entries = vec![
            DirEntry::new("message_id", ctx.inodes.get_or_assign(key("msg-field-id")), NodeKind::File),
            DirEntry::new("conversation_id", ctx.inodes.get_or_assign(key("msg-field-conv")), NodeKind::File),
            DirEntry::new("sequence_id", ctx.inodes.get_or_assign(key("msg-field-seq")), NodeKind::File),
            DirEntry::new("type", ctx.inodes.get_or_assign(key("msg-field-type")), NodeKind::File),
            DirEntry::new("created_at", ctx.inodes.get_or_assign(key("msg-field-created")), NodeKind::File),
            DirEntry::new("content.md", ctx.inodes.get_or_assign(key("msg-content-md")), NodeKind::File),
        ];
        if msg.llm_data.is_some() {
            entries.push(DirEntry::new("llm_data", ctx.inodes.get_or_assign(key("msg-llm-data")), NodeKind::Dir));
        }
        if msg.usage_data.is_some() {
            entries.push(DirEntry::new(
                "usage_data",
                ctx.inodes.get_or_assign(key("msg-usage-data")),
                NodeKind::Dir,
            ));
        }
        Ok(entries)
    }
}

fn leaf(value: &str, time: NodeTime, key: InodeKey) -> Arc<dyn Node> {
    Arc::new(StaticFileNode::new(format!("{value}\n"), 0o444, time, key))
}

fn json_root(
    local_id: &str,
    sequence_id: u64,
    root: &'static str,
    data: &Option<Value>,
    time: NodeTime,
) -> Result<Arc<dyn Node>, FsError> {
    let value = data.as_ref().ok_or(FsError::NotFound)?;
    Ok(Arc::new(JsonTreeNode::new(
        local_id.to_string(),
        sequence_id,
        root,
        Vec::new(),
        value.clone(),
        time,
    )))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Recursively exposes a `serde_json::Value` as a directory tree: objects
/// and arrays become directories (arrays named by index), scalars become
/// `{value}\n` leaf files.
///
/// `local_id`/`sequence_id`/`root`/`path` together identify this node's
/// position in the tree, so that two distinct messages' same-named fields
/// (e.g. both having an `llm_data.role`) get distinct inodes.
pub struct JsonTreeNode {
    local_id: String,
    sequence_id: u64,
    root: &'static str,
    path: Vec<String>,
    value: Value,
    time: NodeTime,
}

impl JsonTreeNode {
    #[must_use]
    pub fn new(
        local_id: String,
        sequence_id: u64,
        root: &'static str,
        path: Vec<String>,
        value: Value,
        time: NodeTime,
    ) -> Self {
        Self { local_id, sequence_id, root, path, value, time }
    }

    fn child(&self, segment: String, value: Value) -> Self {
        let mut path = self.path.clone();
        path.push(segment);
        Self::new(self.local_id.clone(), self.sequence_id, self.root, path, value, self.time)
    }

    fn compute_key(&self) -> InodeKey {
        let field = if self.path.is_empty() {
            self.root.to_string()
        } else {
            format!("{}/{}", self.root, self.path.join("/"))
        };
        InodeKey::new("json-node")
            .with_conversation(&self.local_id)
            .with_sequence(self.sequence_id)
            .with_field(field)
    }
}

impl Node for JsonTreeNode {
    fn inode_key(&self, _ctx: &FsContext) -> InodeKey {
        self.compute_key()
    }

    fn getattr(&self, _ctx: &FsContext) -> Result<Attr, FsError> {
        match &self.value {
            Value::Object(_) | Value::Array(_) => Ok(Attr::dir(self.time)),
            other => {
                let body = format!("{}\n", scalar_text(other));
                Ok(Attr::file_with_perm(body.len() as u64, 0o444, self.time))
            }
        }
    }

    fn lookup(&self, _ctx: &FsContext, name: &str) -> Result<Arc<dyn Node>, FsError> {
        match &self.value {
            Value::Object(map) => {
                let child = map.get(name).ok_or(FsError::NotFound)?;
                Ok(Arc::new(self.child(name.to_string(), child.clone())))
            }
            Value::Array(items) => {
                let idx: usize = name.parse().map_err(|_| FsError::NotFound)?;
                let child = items.get(idx).ok_or(FsError::NotFound)?;
                Ok(Arc::new(self.child(idx.to_string(), child.clone())))
            }
            _ => Err(FsError::NotFound),
        }
    }

    fn readdir(&self, ctx: &FsContext) -> Result<Vec<DirEntry>, FsError> {
        match &self.value {
            Value::Object(map) => Ok(map
                .iter()
                .map(|(key, child_value)| {
                    let kind = match child_value {
                        Value::Object(_) | Value::Array(_) => NodeKind::Dir,
                        _ => NodeKind::File,
                    };
                    let ino = ctx.inodes.get_or_assign(self.child(key.clone(), child_value.clone()).compute_key());
                    DirEntry::new(key.clone(), ino, kind)
                })
                .collect()),
            Value::Array(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    let kind = match item {
                        Value::Object(_) | Value::Array(_) => NodeKind::Dir,
                        _ => NodeKind::File,
                    };
                    let ino = ctx.inodes.get_or_assign(self.child(idx.to_string(), item.clone()).compute_key());
                    DirEntry::new(idx.to_string(), ino, kind)
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn open(&self, _ctx: &FsContext, write: bool) -> Result<HandleState, FsError> {
        if write {
            return Err(FsError::PermissionDenied);
        }
        match &self.value {
            Value::Object(_) | Value::Array(_) => Ok(HandleState::Empty),
            other => Ok(HandleState::ReadBuffer(Arc::new(format!("{}\n", scalar_text(other)).into_bytes()))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::nodes::test_support::test_ctx;
    use serde_json::json;

    fn root_node(value: Value) -> JsonTreeNode {
        JsonTreeNode::new(
            "local1".to_string(),
            1,
            "llm_data",
            Vec::new(),
            value,
            NodeTime::uniform(std::time::SystemTime::UNIX_EPOCH),
        )
    }

    #[tokio::test]
    async fn object_children_are_directories_and_scalars_are_files() {
        let (ctx, _dir) = test_ctx(crate::nodes::test_support::MockBackendClient::new());
        let node = root_node(json!({"role": "assistant", "content": [{"type": "text", "text": "hi"}]}));

        let entries = node.readdir(&ctx).unwrap();
        let role = entries.iter().find(|e| e.name == "role").unwrap();
        assert_eq!(role.kind, NodeKind::File);
        let content = entries.iter().find(|e| e.name == "content").unwrap();
        assert_eq!(content.kind, NodeKind::Dir);
    }

    #[tokio::test]
    async fn array_indices_are_navigable_by_position() {
        let (ctx, _dir) = test_ctx(crate::nodes::test_support::MockBackendClient::new());
        let node = root_node(json!({"content": ["a", "b", "c"]}));
        let content = node.lookup(&ctx, "content").unwrap();

        let entries = content.readdir(&ctx).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].name, "1");

        let second = content.lookup(&ctx, "1").unwrap();
        assert!(matches!(second.getattr(&ctx), Ok(attr) if attr.size == 2)); // "b\n"
    }

    #[tokio::test]
    async fn scalar_lookup_past_a_leaf_is_not_found() {
        let (ctx, _dir) = test_ctx(crate::nodes::test_support::MockBackendClient::new());
        let node = root_node(json!({"role": "assistant"}));
        let role = node.lookup(&ctx, "role").unwrap();
        assert!(matches!(role.lookup(&ctx, "anything"), Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn unknown_object_key_is_not_found() {
        let (ctx, _dir) = test_ctx(crate::nodes::test_support::MockBackendClient::new());
        let node = root_node(json!({"role": "assistant"}));
        assert!(matches!(node.lookup(&ctx, "missing"), Err(FsError::NotFound)));
    }

    #[test]
    fn scalar_text_renders_strings_without_quotes() {
        assert_eq!(scalar_text(&json!("hello")), "hello");
        assert_eq!(scalar_text(&json!(42)), "42");
        assert_eq!(scalar_text(&Value::Null), "null");
    }
}
