//! The parsed-message cache, keyed by `shelley_id`.

use std::hash::Hasher;
use std::sync::Arc;

use dashmap::DashMap;
use fnv::FnvHasher;
use shelleyfs_common::{ConversationPayload, ParsedBundle, build_tool_name_map};
use tracing::trace;

use crate::error::CacheError;

fn fnv1a64(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

fn parse_bundle(raw: &Arc<Vec<u8>>) -> Result<ParsedBundle, CacheError> {
    let payload: ConversationPayload = serde_json::from_slice(raw)?;
    let tool_map = build_tool_name_map(&payload.messages);
    let max_sequence_id = payload.messages.iter().map(|m| m.sequence_id).max().unwrap_or(0);
    Ok(ParsedBundle {
        messages: payload.messages,
        tool_map,
        max_sequence_id,
        checksum: fnv1a64(raw),
        raw: Arc::clone(raw),
    })
}

/// Memoises the JSON parse of a conversation's raw bytes.
///
/// `get_or_parse` exploits two fast paths before falling back to a real
/// parse: pointer identity against L0's cached bytes, then an FNV-1a-64
/// checksum match (for bytes that are equal but not the same allocation).
pub struct ParsedCache {
    entries: DashMap<String, ParsedBundle>,
}

impl Default for ParsedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ParsedCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the `ParsedBundle` for `shelley_id`, parsing `raw` only when
    /// neither fast path applies.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Parse`] if a real parse is required and `raw`
    /// is not a valid `{"messages": [...]}` payload.
    pub fn get_or_parse(
        &self,
        shelley_id: &str,
        raw: &Arc<Vec<u8>>,
    ) -> Result<ParsedBundle, CacheError> {
        if let Some(entry) = self.entries.get(shelley_id) {
            if Arc::ptr_eq(&entry.raw, raw) {
                trace!(shelley_id, "parsed-cache hit: pointer identity");
                return Ok(entry.clone());
            }

            let checksum = fnv1a64(raw);
            if checksum == entry.checksum {
                trace!(shelley_id, "parsed-cache hit: checksum match");
                let mut bundle = entry.clone();
                drop(entry);
                bundle.raw = Arc::clone(raw);
                self.entries.insert(shelley_id.to_string(), bundle.clone());
                return Ok(bundle);
            }
        }

        trace!(shelley_id, "parsed-cache miss: reparsing");
        let parsed = parse_bundle(raw)?;
        self.entries.insert(shelley_id.to_string(), parsed.clone());
        Ok(parsed)
    }

    /// Drops the entry for `shelley_id`. Called in lockstep with L0
    /// invalidation.
    pub fn invalidate(&self, shelley_id: &str) {
        self.entries.remove(shelley_id);
    }
}
