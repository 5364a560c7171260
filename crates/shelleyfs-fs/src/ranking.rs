//! "Most recent conversation" ranking, shared by the root `last/N` symlinks
//! and `conversation/last/N`.

use shelleyfs_common::ConversationRecord;

/// Sorts `records` by `api_updated_at` descending, `api_created_at` as
/// tiebreak, falling back to local `created_at`. Only `created` records
/// participate; callers filter beforehand if needed.
#[must_use]
pub fn rank_most_recent(mut records: Vec<ConversationRecord>) -> Vec<ConversationRecord> {
    records.sort_by(|a, b| {
        let a_key = (rank_key(&a.api_updated_at, a.created_at), rank_key(&a.api_created_at, a.created_at));
        let b_key = (rank_key(&b.api_updated_at, b.created_at), rank_key(&b.api_created_at, b.created_at));
        b_key.cmp(&a_key)
    });
    records
}

fn rank_key(api_value: &str, local_fallback: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(api_value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or(local_fallback)
}

/// 1-indexed lookup into a ranked list: `N` counts from 1, not 0.
#[must_use]
pub fn nth_most_recent(ranked: &[ConversationRecord], n: usize) -> Option<&ConversationRecord> {
    if n == 0 {
        return None;
    }
    ranked.get(n - 1)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use chrono::Utc;

    fn record(local_id: &str, api_updated_at: &str) -> ConversationRecord {
        let mut r = ConversationRecord::new(local_id.to_string(), Utc::now());
        r.created = true;
        r.api_updated_at = api_updated_at.to_string();
        r
    }

    #[test]
    fn ranks_by_api_updated_at_descending() {
        let records = vec![
            record("aaaaaaaa", "2026-01-01T00:00:00Z"),
            record("bbbbbbbb", "2026-06-01T00:00:00Z"),
        ];
        let ranked = rank_most_recent(records);
        assert_eq!(ranked[0].local_id, "bbbbbbbb");
        assert_eq!(nth_most_recent(&ranked, 1).unwrap().local_id, "bbbbbbbb");
        assert_eq!(nth_most_recent(&ranked, 2).unwrap().local_id, "aaaaaaaa");
    }

    #[test]
    fn invalid_n_is_none() {
        let ranked = rank_most_recent(vec![record("aaaaaaaa", "2026-01-01T00:00:00Z")]);
        assert!(nth_most_recent(&ranked, 0).is_none());
        assert!(nth_most_recent(&ranked, 5).is_none());
    }
}
