//! Backend HTTP client and response cache.
//!
//! This crate owns the only network I/O in shelleyfs: the `BackendClient`
//! trait names the operation set the core depends on, `HttpBackendClient`
//! implements it over `reqwest`, and `ResponseCache` is the L0 cache layer
//! that gives the parsed-message cache (L1, in `shelleyfs-cache`) its
//! byte-identity fast path.

mod cache;
mod client;
mod error;
mod wire;

pub use cache::{CacheKey, ResponseCache};
pub use client::{BackendClient, HttpBackendClient};
pub use error::BackendError;
pub use wire::{
    ConversationSummary, ModelInfo, ModelList, NewConversation, parse_conversation_list,
    parse_continue_response, parse_model_list, parse_working_response,
};
