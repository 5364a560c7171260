//! Errors surfaced by the backend client.

use thiserror::Error;

/// Errors from the backend HTTP client. These map onto `EIO`/`ENOENT` at the
/// filesystem boundary by the caller, not by this crate.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or HTTP transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Retry/backoff middleware failure.
    #[error("middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Request or response body did not parse as expected JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `get_conversation` returned HTTP 404: the conversation no longer exists.
    #[error("conversation not found")]
    NotFound,

    /// Backend returned a 5xx status.
    #[error("backend server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The per-call timeout budget was exceeded.
    #[error("backend call timed out")]
    Timeout,

    /// The base URL or client configuration is invalid.
    #[error("client configuration error: {0}")]
    Config(String),
}
