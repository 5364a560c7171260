use thiserror::Error;

/// Errors from the parsed-message cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The raw bytes behind a `shelley_id` did not parse as
    /// `{"messages": [...]}`.
    #[error("conversation payload did not parse: {0}")]
    Parse(#[from] serde_json::Error),
}
