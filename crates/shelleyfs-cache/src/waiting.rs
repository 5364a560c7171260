//! Waiting-for-input analysis: decide whether a conversation
//! is idle, awaiting the user's next message.

use std::collections::HashSet;

use shelleyfs_common::{Message, ToolMap, message_slug, message_tool_result_id, message_tool_use_ids};

/// The result of [`waiting_for_input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingStatus {
    pub waiting: bool,
    pub last_agent_index: Option<usize>,
    pub last_agent_seq_id: Option<u64>,
    pub last_agent_slug: Option<String>,
}

impl WaitingStatus {
    fn idle() -> Self {
        Self {
            waiting: false,
            last_agent_index: None,
            last_agent_seq_id: None,
            last_agent_slug: None,
        }
    }
}

/// Walks `messages` once, tracking the last agent turn and any tool-use ids
/// it is still waiting on a result for.
#[must_use]
pub fn waiting_for_input(messages: &[Message], tool_map: &ToolMap) -> WaitingStatus {
    let mut last_agent_index = None;
    let mut last_agent_seq_id = None;
    let mut last_agent_slug: Option<String> = None;
    let mut pending: HashSet<String> = HashSet::new();
    let mut saw_agent = false;
    let mut trailer_after_agent = false;

    for (idx, msg) in messages.iter().enumerate() {
        if msg.message_type.is_gitinfo() {
            continue;
        }

        let is_tool_result = message_tool_result_id(msg).is_some();
        let is_agent = !msg.message_type.is_user() && !is_tool_result;

        if is_agent {
            saw_agent = true;
            last_agent_index = Some(idx);
            last_agent_seq_id = Some(msg.sequence_id);
            last_agent_slug = Some(message_slug(msg, tool_map));
            pending.extend(message_tool_use_ids(msg));
            trailer_after_agent = false;
            continue;
        }

        if let Some(tool_use_id) = message_tool_result_id(msg) {
            pending.remove(&tool_use_id);
            continue;
        }

        if saw_agent {
            trailer_after_agent = true;
        }
    }

    if !saw_agent || !pending.is_empty() || trailer_after_agent {
        return WaitingStatus::idle();
    }

    WaitingStatus {
        waiting: true,
        last_agent_index,
        last_agent_seq_id,
        last_agent_slug,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use shelleyfs_common::{MessageType, build_tool_name_map};
    use serde_json::json;

    fn msg(seq: u64, ty: &str, data: Option<serde_json::Value>) -> Message {
        Message {
            message_id: format!("m{seq}"),
            conversation_id: "c1".to_string(),
            sequence_id: seq,
            message_type: MessageType(ty.to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            user_data: if ty == "user" { data.clone() } else { None },
            llm_data: if ty == "user" { None } else { data },
            usage_data: None,
        }
    }

    #[test]
    fn waiting_when_last_agent_turn_has_no_open_tools() {
        let msgs = vec![
            msg(1, "user", Some(json!({"content": "hi"}))),
            msg(2, "agent", Some(json!({"content": [{"type": "text", "text": "hey"}]}))),
        ];
        let tool_map = build_tool_name_map(&msgs);
        let status = waiting_for_input(&msgs, &tool_map);
        assert!(status.waiting);
        assert_eq!(status.last_agent_index, Some(1));
        assert_eq!(status.last_agent_seq_id, Some(2));
        assert_eq!(status.last_agent_slug.as_deref(), Some("agent"));
    }

    #[test]
    fn not_waiting_when_tool_use_has_no_result_yet() {
        let msgs = vec![
            msg(1, "user", Some(json!({"content": "hi"}))),
            msg(
                2,
                "agent",
                Some(json!({"content": [{"type": "tool_use", "id": "tu1", "name": "grep"}]})),
            ),
        ];
        let tool_map = build_tool_name_map(&msgs);
        assert!(!waiting_for_input(&msgs, &tool_map).waiting);
    }

    #[test]
    fn waiting_after_tool_result_closes_the_pending_set() {
        let msgs = vec![
            msg(1, "user", Some(json!({"content": "hi"}))),
            msg(
                2,
                "agent",
                Some(json!({"content": [{"type": "tool_use", "id": "tu1", "name": "grep"}]})),
            ),
            msg(
                3,
                "user",
                Some(json!({"content": [{"type": "tool_result", "tool_use_id": "tu1"}]})),
            ),
        ];
        let tool_map = build_tool_name_map(&msgs);
        let status = waiting_for_input(&msgs, &tool_map);
        assert!(status.waiting);
        assert_eq!(status.last_agent_index, Some(1));
    }

    #[test]
    fn not_waiting_when_user_message_follows_the_last_agent_turn() {
        let msgs = vec![
            msg(1, "agent", Some(json!({"content": [{"type": "text", "text": "hey"}]}))),
            msg(2, "user", Some(json!({"content": "thanks"}))),
        ];
        let tool_map = build_tool_name_map(&msgs);
        assert!(!waiting_for_input(&msgs, &tool_map).waiting);
    }

    #[test]
    fn not_waiting_with_no_agent_message_at_all() {
        let msgs = vec![msg(1, "user", Some(json!({"content": "hi"})))];
        let tool_map = build_tool_name_map(&msgs);
        assert!(!waiting_for_input(&msgs, &tool_map).waiting);
    }

    #[test]
    fn gitinfo_messages_are_ignored() {
        let msgs = vec![
            msg(1, "agent", Some(json!({"content": [{"type": "text", "text": "hey"}]}))),
            msg(2, "gitinfo", None),
        ];
        let tool_map = build_tool_name_map(&msgs);
        let status = waiting_for_input(&msgs, &tool_map);
        assert!(status.waiting);
    }
}
