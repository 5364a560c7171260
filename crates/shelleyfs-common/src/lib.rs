//! Data model and filtering/formatting primitives shared across shelleyfs.
//!
//! This crate has no knowledge of HTTP, FUSE, or local persistence. It
//! defines the core domain shapes (`ConversationRecord`, `Message`,
//! `ToolMap`, `ParsedBundle`) and the pure functions that operate on them
//! (filtering, slug derivation, formatting).

mod error;
mod filter;
mod format;
mod message;
mod record;

pub use error::FilterError;
pub use filter::{
    build_tool_name_map, filter_last, filter_since, get_nth_last, message_file_base,
    message_slug, message_tool_result_id, message_tool_use_id, message_tool_use_ids,
};
pub use format::{format_json, format_markdown};
pub use message::{ConversationPayload, Message, MessageType, ParsedBundle, ToolMap};
pub use record::{CtlKey, CtlMap, ConversationRecord, format_ctl_tokens, parse_ctl_tokens};
