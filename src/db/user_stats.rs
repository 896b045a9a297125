//! Per-user digest state: cursor/cooldown reads and the transactional persist step.
//!
//! The monotonic guard on every write is the concurrency story for the
//! whole scheduler: a second evaluation of the same user within the same
//! eligibility window observes the already-advanced `next_summary_at`,
//! writes nothing, and reports that no work was done. No locking is
//! required across batch runs.

use crate::error::DatabaseError;
use crate::types::{ActivitySummary, UserId, UserStats};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::{Database, UserStatsRow, to_ts};

impl Database {
    /// Create the digest bookkeeping row for a new user
    ///
    /// Called when the user account is created. `first_seen_at`,
    /// `last_seen_at` and the topic cursor all start at `now`; the
    /// cooldown watermark starts NULL so the eligibility gate applies the
    /// full-interval grace period before the first possible digest.
    ///
    /// Idempotent: seeding an existing user is a no-op.
    pub async fn seed_user_stats(&self, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
        let ts = to_ts(now);
        sqlx::query(
            r#"
            INSERT INTO user_stats (user_id, first_seen_at, last_seen_at, topics_new_since, next_summary_at)
            VALUES (?, ?, ?, ?, NULL)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id.0)
        .bind(ts)
        .bind(ts)
        .bind(ts)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to seed user stats: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Load one user's digest state
    ///
    /// Returns None for unknown user ids; the scheduler treats that as
    /// "skip silently", not as an error.
    pub async fn load_user_stats(&self, user_id: UserId) -> Result<Option<UserStats>> {
        let row: Option<UserStatsRow> = sqlx::query_as(
            r#"
            SELECT user_id, first_seen_at, last_seen_at, topics_new_since, next_summary_at
            FROM user_stats
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.0)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load user stats: {}",
                e
            )))
        })?;

        Ok(row.map(UserStats::from))
    }

    /// Record user activity (page view, post, login)
    ///
    /// Moves `last_seen_at` forward; never backwards.
    pub async fn record_user_seen(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        let ts = to_ts(at);
        sqlx::query(
            r#"
            UPDATE user_stats SET last_seen_at = ?
            WHERE user_id = ? AND last_seen_at < ?
            "#,
        )
        .bind(ts)
        .bind(user_id.0)
        .bind(ts)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record user activity: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Users whose cooldown has elapsed (or who were never evaluated)
    ///
    /// A cheap superset of the users that may be due at `now`; the
    /// eligibility gate is the authority on whether a digest is actually
    /// produced.
    pub async fn due_candidates(&self, now: DateTime<Utc>) -> Result<Vec<UserId>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM user_stats
            WHERE next_summary_at IS NULL OR next_summary_at <= ?
            ORDER BY user_id
            "#,
        )
        .bind(to_ts(now))
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load due candidates: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
    }

    /// Push the cooldown watermark forward without touching the cursor
    ///
    /// Used on every not-due path so near-term re-evaluation doesn't
    /// thrash. The guard only ever moves the watermark forward, which
    /// keeps `next_summary_at` monotonic even under concurrent runs.
    pub async fn defer_next_summary(&self, user_id: UserId, next: DateTime<Utc>) -> Result<()> {
        let ts = to_ts(next);
        sqlx::query(
            r#"
            UPDATE user_stats SET next_summary_at = ?
            WHERE user_id = ? AND (next_summary_at IS NULL OR next_summary_at < ?)
            "#,
        )
        .bind(ts)
        .bind(user_id.0)
        .bind(ts)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to defer next summary: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Clear the cooldown watermark
    ///
    /// Used when the effective interval is the do-not-send sentinel. The
    /// cursor is untouched: if digests are re-enabled later, only topics
    /// never considered before become candidates.
    pub async fn clear_next_summary(&self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE user_stats SET next_summary_at = NULL WHERE user_id = ?")
            .bind(user_id.0)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear next summary: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Atomically advance the cooldown and cursor for a due evaluation
    ///
    /// In one transaction: move `next_summary_at` to `next`, move
    /// `topics_new_since` forward to `cursor`, and (when a digest was
    /// produced) insert the digest-log marker row. The update carries the
    /// eligibility-window guard `next_summary_at IS NULL OR <= now`, so a
    /// concurrent evaluation that already advanced the watermark makes
    /// this call a no-op.
    ///
    /// Returns true if this call won the window and the state was
    /// persisted; false if another evaluation got there first (the caller
    /// must then discard its summary).
    pub async fn advance_cursor(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        next: DateTime<Utc>,
        cursor: DateTime<Utc>,
        produced: Option<&ActivitySummary>,
    ) -> Result<bool> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE user_stats
            SET next_summary_at = ?,
                topics_new_since = MAX(topics_new_since, ?)
            WHERE user_id = ?
              AND (next_summary_at IS NULL OR next_summary_at <= ?)
            "#,
        )
        .bind(to_ts(next))
        .bind(to_ts(cursor))
        .bind(user_id.0)
        .bind(to_ts(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to advance cursor: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            // Another evaluation already claimed this window
            tx.rollback().await.map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to roll back transaction: {}",
                    e
                )))
            })?;
            return Ok(false);
        }

        if let Some(summary) = produced {
            sqlx::query(
                r#"
                INSERT INTO digest_log (user_id, produced_at, topic_count, window_start, window_end)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id.0)
            .bind(to_ts(summary.generated_at))
            .bind(summary.topics.len() as i64)
            .bind(
                summary
                    .topics
                    .iter()
                    .map(|t| to_ts(t.created_at))
                    .min()
                    .unwrap_or_else(|| to_ts(cursor)),
            )
            .bind(to_ts(cursor))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert digest log entry: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit cursor advance: {}",
                e
            )))
        })?;

        Ok(true)
    }
}
