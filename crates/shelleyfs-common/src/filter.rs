//! Filtering and labelling primitives over a monotonic `sequence_id`-ordered
//! message slice.
//!
//! All functions here assume `msgs` is already in ascending `sequence_id`
//! order — the backend guarantees this and the parser does not re-sort.

use crate::error::FilterError;
use crate::message::{Message, ToolMap, block_tool_result_id, block_tool_use, content_blocks};

/// Returns the last `N` messages (fewer if `N` exceeds the length).
///
/// # Panics
///
/// Never panics; `n == 0` returns an empty slice.
#[must_use]
pub fn filter_last(msgs: &[Message], n: usize) -> &[Message] {
    let start = msgs.len().saturating_sub(n);
    &msgs[start..]
}

/// The Nth-from-last message (1-indexed), or `None` if out of range.
#[must_use]
pub fn get_nth_last(msgs: &[Message], n: usize) -> Option<&Message> {
    if n == 0 {
        return None;
    }
    msgs.len().checked_sub(n).map(|idx| &msgs[idx])
}

/// Locates the Nth-from-last message whose slug equals `actor` (1 = most
/// recent) and returns all messages strictly after it. `N` must be >= 1.
///
/// # Errors
///
/// Returns [`FilterError::NotEnoughMatches`] if fewer than `N` matches exist.
pub fn filter_since<'a>(
    msgs: &'a [Message],
    actor: &str,
    n: usize,
    tool_map: &ToolMap,
) -> Result<&'a [Message], FilterError> {
    if n == 0 {
        return Err(FilterError::InvalidIndex("0".to_string()));
    }

    let mut seen = 0usize;
    for (idx, msg) in msgs.iter().enumerate().rev() {
        if message_slug(msg, tool_map) == actor {
            seen += 1;
            if seen == n {
                return Ok(&msgs[idx + 1..]);
            }
        }
    }

    Err(FilterError::NotEnoughMatches {
        actor: actor.to_string(),
        requested: n,
    })
}

/// Derives the display slug for a message: `user`, `gitinfo`,
/// `{tool}-result`, `{tool}-tool`, `agent`, falling back to `user`.
#[must_use]
pub fn message_slug(msg: &Message, tool_map: &ToolMap) -> String {
    if msg.message_type.is_gitinfo() {
        return "gitinfo".to_string();
    }

    let data = msg.llm_data.as_ref().or(msg.user_data.as_ref());

    if let Some(data) = data {
        let blocks = content_blocks(data);

        for block in blocks {
            if let Some(tool_use_id) = block_tool_result_id(block) {
                let tool = tool_map
                    .get(tool_use_id)
                    .cloned()
                    .unwrap_or_else(|| "tool".to_string());
                return format!("{tool}-result");
            }
        }

        for block in blocks {
            if let Some((_, name)) = block_tool_use(block) {
                return format!("{name}-tool");
            }
        }

        if !msg.message_type.is_user() {
            return "agent".to_string();
        }
    }

    "user".to_string()
}

/// The tool-use id this message's content carries, if any (for tool-call
/// messages).
#[must_use]
pub fn message_tool_use_id(msg: &Message) -> Option<String> {
    let data = msg.llm_data.as_ref().or(msg.user_data.as_ref())?;
    content_blocks(data)
        .iter()
        .find_map(|b| block_tool_use(b).map(|(id, _)| id.to_string()))
}

/// The tool-use id this message's content responds to, if any (for
/// tool-result messages).
#[must_use]
pub fn message_tool_result_id(msg: &Message) -> Option<String> {
    let data = msg.llm_data.as_ref().or(msg.user_data.as_ref())?;
    content_blocks(data)
        .iter()
        .find_map(|b| block_tool_result_id(b).map(str::to_string))
}

/// Every tool-use id this message's content carries (an agent message may
/// emit more than one tool call in a single turn).
#[must_use]
pub fn message_tool_use_ids(msg: &Message) -> Vec<String> {
    let Some(data) = msg.llm_data.as_ref().or(msg.user_data.as_ref()) else {
        return Vec::new();
    };
    content_blocks(data)
        .iter()
        .filter_map(|b| block_tool_use(b).map(|(id, _)| id.to_string()))
        .collect()
}

/// Builds the tool-use-id -> tool-name map by a single pass over every
/// message's content.
#[must_use]
pub fn build_tool_name_map(msgs: &[Message]) -> ToolMap {
    let mut map = ToolMap::new();
    for msg in msgs {
        let Some(data) = msg.llm_data.as_ref() else {
            continue;
        };
        for block in content_blocks(data) {
            if let Some((id, name)) = block_tool_use(block) {
                map.insert(id.to_string(), name.to_string());
            }
        }
    }
    map
}

/// The directory-name base for a message: `{index-padded}-{slug}`, where
/// `index = sequence_id - 1` and the padding width is derived from the
/// *maximum* sequence id in the conversation.
#[must_use]
pub fn message_file_base(sequence_id: u64, slug: &str, max_sequence_id: u64) -> String {
    let index = sequence_id.saturating_sub(1);
    let width = digit_width(max_sequence_id.saturating_sub(1));
    format!("{index:0width$}-{slug}")
}

fn digit_width(n: u64) -> usize {
    n.to_string().len()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::message::MessageType;
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

    fn five_message_thread() -> (Vec<Message>, ToolMap) {
        let msgs = vec![
            msg(1, "user", Some(json!({"content": "hi"}))),
            msg(2, "agent", Some(json!({"content": [{"type": "text", "text": "hey"}]}))),
            msg(3, "user", Some(json!({"content": "again"}))),
            msg(4, "agent", Some(json!({"content": [{"type": "text", "text": "ok"}]}))),
            msg(5, "user", Some(json!({"content": "bye"}))),
        ];
        let tool_map = build_tool_name_map(&msgs);
        (msgs, tool_map)
    }

    #[test]
    fn filter_last_returns_tail() {
        let (msgs, _) = five_message_thread();
        let last2 = filter_last(&msgs, 2);
        assert_eq!(last2.len(), 2);
        assert_eq!(last2[0].sequence_id, 4);
        assert_eq!(last2[1].sequence_id, 5);
    }

    #[test]
    fn filter_last_n_exceeds_length() {
        let (msgs, _) = five_message_thread();
        assert_eq!(filter_last(&msgs, 100).len(), 5);
    }

    #[test]
    fn filter_since_user_2_matches_scenario_4() {
        let (msgs, tool_map) = five_message_thread();
        let since = filter_since(&msgs, "user", 2, &tool_map).unwrap();
        let seqs: Vec<u64> = since.iter().map(|m| m.sequence_id).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn filter_since_last_user_has_no_successors() {
        let (msgs, tool_map) = five_message_thread();
        let since = filter_since(&msgs, "user", 1, &tool_map).unwrap();
        assert!(since.is_empty());
    }

    #[test]
    fn filter_since_not_enough_matches() {
        let (msgs, tool_map) = five_message_thread();
        let err = filter_since(&msgs, "user", 10, &tool_map).unwrap_err();
        assert!(matches!(err, FilterError::NotEnoughMatches { .. }));
    }

    #[test]
    fn get_nth_last_basic() {
        let (msgs, _) = five_message_thread();
        assert_eq!(get_nth_last(&msgs, 1).unwrap().sequence_id, 5);
        assert_eq!(get_nth_last(&msgs, 5).unwrap().sequence_id, 1);
        assert!(get_nth_last(&msgs, 6).is_none());
        assert!(get_nth_last(&msgs, 0).is_none());
    }

    #[test]
    fn message_file_base_padding_from_max_sequence() {
        // max_sequence_id = 12 -> width(11) = 2
        assert_eq!(message_file_base(1, "user", 12), "00-user");
        assert_eq!(message_file_base(12, "agent", 12), "11-agent");
    }

    #[test]
    fn tool_use_and_result_slugs() {
        let tool_use_msg = msg(
            2,
            "agent",
            Some(json!({"content": [{"type": "tool_use", "id": "tu1", "name": "grep"}]})),
        );
        let tool_map = build_tool_name_map(std::slice::from_ref(&tool_use_msg));
        assert_eq!(message_slug(&tool_use_msg, &tool_map), "grep-tool");

        let tool_result_msg = msg(
            3,
            "user",
            Some(json!({"content": [{"type": "tool_result", "tool_use_id": "tu1"}]})),
        );
        assert_eq!(message_slug(&tool_result_msg, &tool_map), "grep-result");
    }

    #[test]
    fn gitinfo_slug() {
        let gitinfo = msg(1, "gitinfo", None);
        assert_eq!(message_slug(&gitinfo, &ToolMap::new()), "gitinfo");
    }
}
