//! Rendering of message slices to the two presentation formats the
//! filesystem serves message content in: JSON and Markdown.

use serde_json::Value;

use crate::filter::message_slug;
use crate::message::{Message, ToolMap};

/// Renders `msgs` as a pretty-printed JSON array of the underlying message
/// records (the whole `Message`, not just its text content).
///
/// # Errors
///
/// Returns the `serde_json` error if serialisation somehow fails (it never
/// does for a `Vec<Message>`, but the caller owns the `Result`).
pub fn format_json(msgs: &[Message]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(msgs)
}

/// Renders `msgs` as Markdown: one `##`-level header per message, naming its
/// derived slug, followed by its extracted text content.
#[must_use]
pub fn format_markdown(msgs: &[Message], tool_map: &ToolMap) -> String {
    let mut out = String::new();
    for msg in msgs {
        let slug = message_slug(msg, tool_map);
        out.push_str("## ");
        out.push_str(&slug);
        out.push('\n');
        out.push('\n');

        let text = message_text(msg);
        if !text.is_empty() {
            out.push_str(&text);
            out.push('\n');
            out.push('\n');
        }
    }
    out
}

/// Extracts the human-readable text from a message's content, flattening
/// `text`-typed content blocks. Non-text payloads (tool calls, tool
/// results, usage) render as nothing here; their raw JSON remains available
/// via [`format_json`].
fn message_text(msg: &Message) -> String {
    let Some(data) = msg.llm_data.as_ref().or(msg.user_data.as_ref()) else {
        return String::new();
    };

    match data.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => String::new(),
    }
}
