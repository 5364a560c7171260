//! `Message`, `ToolMap`, and `ParsedBundle`: the transient data reconstructed
//! from backend responses.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message's backend-reported type. Kept as an owned string rather than a
/// closed enum because the backend may introduce new agent-type variants;
/// the filter layer only ever needs to distinguish `user` and `gitinfo` from
/// everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(pub String);

impl MessageType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.0 == "user"
    }

    #[must_use]
    pub fn is_gitinfo(&self) -> bool {
        self.0 == "gitinfo"
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single message in a conversation, as reconstructed from the backend's
/// `{"messages": [...]}` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub sequence_id: u64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_data: Option<Value>,
}

/// The wire envelope returned by `get_conversation`: `{"messages": [...]}`.
#[derive(Debug, Deserialize)]
pub struct ConversationPayload {
    pub messages: Vec<Message>,
}

/// Tool-use id -> tool name, built by a single pass over agent-message
/// content (see [`crate::build_tool_name_map`]).
pub type ToolMap = HashMap<String, String>;

/// The unit of memoisation at the parsed-message layer.
#[derive(Clone)]
pub struct ParsedBundle {
    pub messages: Vec<Message>,
    pub tool_map: ToolMap,
    pub max_sequence_id: u64,
    pub checksum: u64,
    pub raw: Arc<Vec<u8>>,
}

/// Returns the `content` array of an agent/tool payload, if present.
///
/// Content blocks follow the common `{"type": ..., ...}` shape used by
/// chat-completion style APIs: `tool_use` blocks carry `id`/`name`,
/// `tool_result` blocks carry `tool_use_id`. The payload is otherwise
/// treated as an opaque raw JSON payload.
pub fn content_blocks(data: &Value) -> &[Value] {
    data.get("content")
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// The `type` discriminator of a content block (`"text"`, `"tool_use"`,
/// `"tool_result"`, ...), if present.
#[must_use]
pub fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(Value::as_str)
}

/// For a `tool_use` block, its id and tool name.
#[must_use]
pub fn block_tool_use(block: &Value) -> Option<(&str, &str)> {
    if block_type(block) != Some("tool_use") {
        return None;
    }
    let id = block.get("id").and_then(Value::as_str)?;
    let name = block.get("name").and_then(Value::as_str)?;
    Some((id, name))
}

/// For a `tool_result` block, the id of the tool-use it responds to.
#[must_use]
pub fn block_tool_result_id(block: &Value) -> Option<&str> {
    if block_type(block) != Some("tool_result") {
        return None;
    }
    block.get("tool_use_id").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_message() {
        let raw = json!({
            "message_id": "m1",
            "conversation_id": "c1",
            "sequence_id": 1,
            "type": "user",
            "created_at": "2026-01-01T00:00:00Z",
            "user_data": {"content": "hi"}
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert!(msg.message_type.is_user());
        assert_eq!(msg.sequence_id, 1);
        assert!(msg.llm_data.is_none());
    }

    #[test]
    fn content_block_helpers() {
        let data = json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "tool_use", "id": "tu_1", "name": "grep"}
            ]
        });
        let blocks = content_blocks(&data);
        assert_eq!(blocks.len(), 2);
        assert_eq!(block_tool_use(&blocks[1]), Some(("tu_1", "grep")));
        assert!(block_tool_use(&blocks[0]).is_none());
    }
}
