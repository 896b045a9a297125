//! Topic storage, read tracking, and category visibility lookups.

use crate::error::DatabaseError;
use crate::types::{CategoryId, GroupId, PageId, TopicMeta, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::{Database, TopicRow, to_ts};

impl Database {
    /// Insert a new topic
    pub async fn insert_topic(&self, topic: &TopicMeta) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topics (page_id, author_id, created_at, category_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(topic.page_id.0)
        .bind(topic.author_id.0)
        .bind(to_ts(topic.created_at))
        .bind(topic.category_id.0)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert topic: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Candidate topics for one user's digest window
    ///
    /// Topics created in `[since, until]`, authored by someone else, and
    /// not yet read by the user. Ascending by creation time; the selector
    /// owns the final ordering. Authorization filtering happens in the
    /// collector, not here.
    pub async fn unread_candidate_topics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<TopicMeta>> {
        let rows: Vec<TopicRow> = sqlx::query_as(
            r#"
            SELECT t.page_id, t.author_id, t.created_at, t.category_id
            FROM topics t
            WHERE t.created_at >= ?
              AND t.created_at <= ?
              AND t.author_id != ?
              AND NOT EXISTS (
                  SELECT 1 FROM topic_reads r
                  WHERE r.user_id = ? AND r.page_id = t.page_id
              )
            ORDER BY t.created_at ASC, t.page_id ASC
            "#,
        )
        .bind(to_ts(since))
        .bind(to_ts(until))
        .bind(user_id.0)
        .bind(user_id.0)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load candidate topics: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(TopicMeta::from).collect())
    }

    /// Mark a topic as read by a user
    pub async fn mark_topic_read(
        &self,
        user_id: UserId,
        page_id: PageId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let ts = to_ts(at);
        sqlx::query(
            r#"
            INSERT INTO topic_reads (user_id, page_id, read_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, page_id) DO UPDATE SET read_at = ?
            "#,
        )
        .bind(user_id.0)
        .bind(page_id.0)
        .bind(ts)
        .bind(ts)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark topic read: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Check whether a user has read a topic
    pub async fn has_user_read(&self, user_id: UserId, page_id: PageId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM topic_reads WHERE user_id = ? AND page_id = ?",
        )
        .bind(user_id.0)
        .bind(page_id.0)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check read state: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    /// Create or update a category
    pub async fn upsert_category(&self, category_id: CategoryId, restricted: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (category_id, restricted)
            VALUES (?, ?)
            ON CONFLICT(category_id) DO UPDATE SET restricted = excluded.restricted
            "#,
        )
        .bind(category_id.0)
        .bind(i64::from(restricted))
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert category: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Grant a group access to a restricted category
    ///
    /// Granting access to [`GroupId::EVERYONE`] opens the category to all
    /// users.
    pub async fn grant_category_access(
        &self,
        category_id: CategoryId,
        group_id: GroupId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO category_access (category_id, group_id)
            VALUES (?, ?)
            ON CONFLICT(category_id, group_id) DO NOTHING
            "#,
        )
        .bind(category_id.0)
        .bind(group_id.0)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to grant category access: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Whether a category restricts visibility
    ///
    /// An unknown category is reported as restricted (fail closed).
    pub async fn is_category_restricted(&self, category_id: CategoryId) -> Result<bool> {
        let restricted: Option<i64> =
            sqlx::query_scalar("SELECT restricted FROM categories WHERE category_id = ?")
                .bind(category_id.0)
                .fetch_optional(self.pool())
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to load category: {}",
                        e
                    )))
                })?;

        Ok(restricted.map(|r| r != 0).unwrap_or(true))
    }

    /// Whether a user may access a restricted category
    ///
    /// True if any of the user's groups was granted access, or if access
    /// was granted to the Everyone group.
    pub async fn user_has_category_access(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM category_access ca
            LEFT JOIN group_members gm
                ON gm.group_id = ca.group_id AND gm.user_id = ?
            WHERE ca.category_id = ?
              AND (ca.group_id = ? OR gm.user_id IS NOT NULL)
            "#,
        )
        .bind(user_id.0)
        .bind(category_id.0)
        .bind(GroupId::EVERYONE.0)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check category access: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }
}
