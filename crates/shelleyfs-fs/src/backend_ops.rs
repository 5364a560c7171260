//! Shared backend round-trips used by several node types: fetching and
//! parsing a conversation's messages, listing models, and resolving the
//! model id a `send` should use.

use std::sync::Arc;

use shelleyfs_client::{ConversationSummary, ModelInfo, ModelList, parse_conversation_list, parse_model_list};
use shelleyfs_common::{ConversationRecord, CtlKey, ParsedBundle, ToolMap};

use crate::bridge::run_blocking;
use crate::error::FsError;
use crate::fscontext::FsContext;

/// Resolves the current `ParsedBundle` for `record`, going through L0 and
/// L1. Uncreated conversations have no backend identity yet and resolve to
/// an empty bundle without a network round trip.
pub fn fetch_bundle(ctx: &FsContext, record: &ConversationRecord) -> Result<ParsedBundle, FsError> {
    if !record.created {
        return Ok(ParsedBundle {
            messages: Vec::new(),
            tool_map: ToolMap::new(),
            max_sequence_id: 0,
            checksum: 0,
            raw: Arc::new(Vec::new()),
        });
    }

    let client = Arc::clone(&ctx.client);
    let shelley_id = record.shelley_id.clone();
    let raw = run_blocking(&ctx.runtime, async move {
        client.get_conversation(&shelley_id).await.map_err(FsError::from)
    })?;
    ctx.parsed_cache.get_or_parse(&record.shelley_id, &raw).map_err(FsError::from)
}

/// Fetches and parses `list_models`.
pub fn fetch_models(ctx: &FsContext) -> Result<ModelList, FsError> {
    let client = Arc::clone(&ctx.client);
    let raw = run_blocking(&ctx.runtime, async move {
        client.list_models().await.map_err(FsError::from)
    })?;
    parse_model_list(&raw).map_err(|e| FsError::Io(e.to_string()))
}

/// Fetches and parses `list_conversations`, used for stale-tolerant
/// filtering of records whose `shelley_id` the backend no longer lists.
pub fn fetch_conversation_summaries(ctx: &FsContext) -> Result<Vec<ConversationSummary>, FsError> {
    let client = Arc::clone(&ctx.client);
    let raw = run_blocking(&ctx.runtime, async move {
        client.list_conversations().await.map_err(FsError::from)
    })?;
    parse_conversation_list(&raw).map_err(|e| FsError::Io(e.to_string()))
}

#[must_use]
pub fn display_name(model: &ModelInfo) -> &str {
    model.display_name.as_deref().unwrap_or(&model.id)
}

/// The model id a `send` flush should use: `ctl.model_id` if set, else
/// `ctl.model` resolved through a fresh model-list lookup, else the
/// backend's default model.
pub fn resolve_model_id(ctx: &FsContext, record: &ConversationRecord) -> Result<String, FsError> {
    if let Some(id) = record.ctl.get(&CtlKey::ModelId) {
        return Ok(id.clone());
    }

    let models = fetch_models(ctx)?;

    if let Some(name) = record.ctl.get(&CtlKey::Model) {
        if let Some(model) = models.models.iter().find(|m| display_name(m) == name) {
            return Ok(model.id.clone());
        }
    }

    models.default_model_id.ok_or_else(|| {
        FsError::Io("no model selected and the backend has no default model".to_string())
    })
}
