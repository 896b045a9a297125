//! Digest log queries.
//!
//! The log rows themselves are inserted by
//! [`Database::advance_cursor`](super::Database::advance_cursor) inside
//! the same transaction as the cursor advance.

use crate::error::DatabaseError;
use crate::types::UserId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::{Database, DigestLogRow, from_ts};

impl Database {
    /// Most recent digest log entries for a user, newest first
    pub async fn digest_history(&self, user_id: UserId, limit: i64) -> Result<Vec<DigestLogRow>> {
        let rows: Vec<DigestLogRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, produced_at, topic_count, window_start, window_end
            FROM digest_log
            WHERE user_id = ?
            ORDER BY produced_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load digest history: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// When the last digest was produced for a user, if ever
    pub async fn last_digest_at(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<i64> =
            sqlx::query_scalar("SELECT MAX(produced_at) FROM digest_log WHERE user_id = ?")
                .bind(user_id.0)
                .fetch_one(self.pool())
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to load last digest time: {}",
                        e
                    )))
                })?;

        Ok(ts.map(from_ts))
    }

    /// Total number of digests ever produced for a user
    pub async fn count_digests(&self, user_id: UserId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM digest_log WHERE user_id = ?")
                .bind(user_id.0)
                .fetch_one(self.pool())
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to count digests: {}",
                        e
                    )))
                })?;

        Ok(count)
    }
}
