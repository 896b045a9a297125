//! Ranking and capping of candidate topics.
//!
//! Whatever the selector keeps or drops, the caller advances the cursor
//! past every candidate it was handed: topics squeezed out by the cap are
//! permanently skipped, not queued for a later digest. This is a
//! deliberate loss policy: a digest is a sample of recent activity, not
//! a backlog.

use crate::types::TopicMeta;

/// Select the topics to include in a digest, newest first
///
/// Ranks by recency and truncates to `cap`.
pub fn select(candidates: Vec<TopicMeta>, cap: usize) -> Vec<TopicMeta> {
    select_with(candidates, cap, |topic| topic.created_at.timestamp())
}

/// Select with a custom score (higher scores rank first)
///
/// Ties break toward newer topics so the default and custom paths order
/// deterministically.
pub fn select_with<F>(mut candidates: Vec<TopicMeta>, cap: usize, score: F) -> Vec<TopicMeta>
where
    F: Fn(&TopicMeta) -> i64,
{
    candidates.sort_by(|a, b| {
        score(b)
            .cmp(&score(a))
            .then(b.created_at.cmp(&a.created_at))
            .then(b.page_id.cmp(&a.page_id))
    });
    candidates.truncate(cap);
    candidates
}
