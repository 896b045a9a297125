//! Database layer for activity-digest
//!
//! Handles SQLite persistence for per-user digest state, preference
//! overrides, topics, read tracking, and the digest log.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`user_stats`] - Per-user cursor/cooldown state and the transactional persist step
//! - [`preferences`] - User/group override CRUD and the ordered override chain
//! - [`topics`] - Topic storage, read tracking, category visibility
//! - [`digests`] - Digest log queries
//! - [`state`] - Runtime state (clean-shutdown tracking)

use crate::types::{CategoryId, PageId, TopicMeta, UserId, UserStats};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod digests;
mod migrations;
mod preferences;
mod state;
mod topics;
mod user_stats;

/// Convert an instant to the unix-seconds representation stored in SQLite
pub(crate) fn to_ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Convert a stored unix-seconds value back to an instant
pub(crate) fn from_ts(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Per-user digest state record (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct UserStatsRow {
    /// The user this record belongs to
    pub user_id: i64,
    /// Unix timestamp when the user account was created
    pub first_seen_at: Option<i64>,
    /// Unix timestamp of the user's last activity
    pub last_seen_at: i64,
    /// Cursor: unix timestamp separating processed from new topics
    pub topics_new_since: i64,
    /// Unix timestamp before which no digest may be produced (NULL = never evaluated)
    pub next_summary_at: Option<i64>,
}

impl From<UserStatsRow> for UserStats {
    fn from(row: UserStatsRow) -> Self {
        UserStats {
            user_id: UserId(row.user_id),
            first_seen_at: row.first_seen_at.map(from_ts),
            last_seen_at: from_ts(row.last_seen_at),
            topics_new_since: from_ts(row.topics_new_since),
            next_summary_at: row.next_summary_at.map(from_ts),
        }
    }
}

/// Topic record from database
#[derive(Debug, Clone, FromRow)]
pub struct TopicRow {
    /// The topic's page id
    pub page_id: i64,
    /// Who created the topic
    pub author_id: i64,
    /// Unix timestamp when the topic was created
    pub created_at: i64,
    /// The category the topic lives in
    pub category_id: i64,
}

impl From<TopicRow> for TopicMeta {
    fn from(row: TopicRow) -> Self {
        TopicMeta {
            page_id: PageId(row.page_id),
            author_id: UserId(row.author_id),
            created_at: from_ts(row.created_at),
            category_id: CategoryId(row.category_id),
        }
    }
}

/// Digest log record from database
///
/// One row per produced digest, inserted in the same transaction as the
/// cursor advance. This is the at-most-once marker per eligibility window.
#[derive(Debug, Clone, FromRow)]
pub struct DigestLogRow {
    /// Unique database ID
    pub id: i64,
    /// The user the digest was produced for
    pub user_id: i64,
    /// Unix timestamp when the digest was generated
    pub produced_at: i64,
    /// Number of topics included
    pub topic_count: i64,
    /// Start of the candidate window (previous cursor)
    pub window_start: i64,
    /// End of the candidate window (new cursor)
    pub window_end: i64,
}

/// Database handle for activity-digest
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
