//! Timestamp resolution for synthesized filesystem entries.
//!
//! Every `Getattr` sets `mtime`/`ctime` from domain time, never wall-clock
//! now, falling back to the next source in the chain if the previous one is
//! empty or zero.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// An `mtime`/`ctime` pair attached to a node's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTime {
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl NodeTime {
    #[must_use]
    pub fn uniform(t: SystemTime) -> Self {
        Self { mtime: t, ctime: t }
    }
}

/// Parses a backend-supplied RFC3339 string, returning `None` for an empty
/// string or a string that doesn't parse (treated as "unknown", not an
/// error — callers fall back to the next source in the chain).
#[must_use]
pub fn parse_rfc3339(s: &str) -> Option<SystemTime> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).into())
}

#[must_use]
pub fn from_chrono(dt: DateTime<Utc>) -> SystemTime {
    dt.into()
}

/// Resolves a single timestamp source chain: first RFC3339 string that
/// parses, else the local fallback (itself already resolved against
/// filesystem start time by the caller).
#[must_use]
pub fn resolve(primary: Option<&str>, local_fallback: SystemTime) -> SystemTime {
    primary.and_then(parse_rfc3339).unwrap_or(local_fallback)
}

/// The `conversation/{id}/` and status-file timestamp rule: mtime from
/// `api_updated_at`, ctime from `api_created_at`, both falling back to the
/// record's local `created_at`, then filesystem start time.
#[must_use]
pub fn conversation_time(
    api_created_at: &str,
    api_updated_at: &str,
    local_created_at: SystemTime,
) -> NodeTime {
    NodeTime {
        mtime: resolve(Some(api_updated_at), local_created_at),
        ctime: resolve(Some(api_created_at), local_created_at),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_valid_rfc3339() {
        let t = parse_rfc3339("2026-01-01T00:00:00Z");
        assert!(t.is_some());
    }

    #[test]
    fn empty_string_is_none() {
        assert!(parse_rfc3339("").is_none());
    }

    #[test]
    fn falls_back_through_the_chain() {
        let local = SystemTime::UNIX_EPOCH + Duration::from_secs(500);
        assert_eq!(resolve(None, local), local);
        assert_eq!(resolve(Some(""), local), local);

        let parsed = parse_rfc3339("2026-01-01T00:00:00Z").expect("valid");
        assert_eq!(resolve(Some("2026-01-01T00:00:00Z"), local), parsed);
    }
}
