use thiserror::Error;

/// Errors raised by the message-history filtering primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// `filter_since` could not find `N` messages from the requested actor.
    #[error("not found: fewer than {requested} messages from actor '{actor}'")]
    NotEnoughMatches { actor: String, requested: usize },

    /// A query index was invalid (zero, or not parseable as a positive integer).
    #[error("invalid index: {0}")]
    InvalidIndex(String),
}
