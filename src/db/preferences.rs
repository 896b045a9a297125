//! Digest preference overrides at user and group scope.
//!
//! NULL columns mean "inherit from the next layer"; the resolver walks
//! user → explicit groups (in membership order) → Everyone → compiled-in
//! default and takes the first defined value per setting.

use crate::error::DatabaseError;
use crate::types::{DigestInterval, GroupId, PreferenceOverride, UserId};
use crate::{Error, Result};

use super::Database;

/// Preference override row shared by user and group scope
#[derive(Debug, Clone, sqlx::FromRow)]
struct PrefsRow {
    interval_minutes: Option<i64>,
    send_even_if_active: Option<i64>,
}

impl From<PrefsRow> for PreferenceOverride {
    fn from(row: PrefsRow) -> Self {
        PreferenceOverride {
            interval: row.interval_minutes.map(DigestInterval::from),
            send_even_if_active: row.send_even_if_active.map(|v| v != 0),
        }
    }
}

impl Database {
    /// Load a user's explicit preference overrides, if any
    pub async fn load_user_prefs(&self, user_id: UserId) -> Result<Option<PreferenceOverride>> {
        let row: Option<PrefsRow> = sqlx::query_as(
            "SELECT interval_minutes, send_even_if_active FROM user_prefs WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load user preferences: {}",
                e
            )))
        })?;

        Ok(row.map(PreferenceOverride::from))
    }

    /// Set (or replace) a user's preference overrides
    pub async fn set_user_prefs(
        &self,
        user_id: UserId,
        prefs: PreferenceOverride,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_prefs (user_id, interval_minutes, send_even_if_active)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE
                SET interval_minutes = excluded.interval_minutes,
                    send_even_if_active = excluded.send_even_if_active
            "#,
        )
        .bind(user_id.0)
        .bind(prefs.interval.map(i64::from))
        .bind(prefs.send_even_if_active.map(i64::from))
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set user preferences: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove a user's preference overrides (the user inherits again)
    pub async fn clear_user_prefs(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM user_prefs WHERE user_id = ?")
            .bind(user_id.0)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear user preferences: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Load a group's preference overrides, if any
    pub async fn load_group_prefs(&self, group_id: GroupId) -> Result<Option<PreferenceOverride>> {
        let row: Option<PrefsRow> = sqlx::query_as(
            "SELECT interval_minutes, send_even_if_active FROM group_prefs WHERE group_id = ?",
        )
        .bind(group_id.0)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load group preferences: {}",
                e
            )))
        })?;

        Ok(row.map(PreferenceOverride::from))
    }

    /// Set (or replace) a group's preference overrides
    ///
    /// Setting prefs on [`GroupId::EVERYONE`] changes the platform-wide
    /// default for every user without an explicit override.
    pub async fn set_group_prefs(
        &self,
        group_id: GroupId,
        prefs: PreferenceOverride,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_prefs (group_id, interval_minutes, send_even_if_active)
            VALUES (?, ?, ?)
            ON CONFLICT(group_id) DO UPDATE
                SET interval_minutes = excluded.interval_minutes,
                    send_even_if_active = excluded.send_even_if_active
            "#,
        )
        .bind(group_id.0)
        .bind(prefs.interval.map(i64::from))
        .bind(prefs.send_even_if_active.map(i64::from))
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set group preferences: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Add a user to a group at the given position in their override walk
    pub async fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        position: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, position)
            VALUES (?, ?, ?)
            ON CONFLICT(group_id, user_id) DO UPDATE SET position = excluded.position
            "#,
        )
        .bind(group_id.0)
        .bind(user_id.0)
        .bind(position)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to add group member: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Remove a user from a group
    pub async fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.0)
            .bind(user_id.0)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to remove group member: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Load the full ordered override chain for one user
    ///
    /// Order: the user's own overrides, then each explicit group's
    /// overrides in membership order, then the Everyone group's. Layers
    /// without a row are simply absent; the compiled-in default is not
    /// part of the chain (the resolver appends it).
    pub async fn load_preference_chain(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PreferenceOverride>> {
        let mut chain = Vec::new();

        if let Some(user_prefs) = self.load_user_prefs(user_id).await? {
            chain.push(user_prefs);
        }

        let group_rows: Vec<PrefsRow> = sqlx::query_as(
            r#"
            SELECT gp.interval_minutes, gp.send_even_if_active
            FROM group_members gm
            JOIN group_prefs gp ON gp.group_id = gm.group_id
            WHERE gm.user_id = ? AND gm.group_id != ?
            ORDER BY gm.position, gm.group_id
            "#,
        )
        .bind(user_id.0)
        .bind(GroupId::EVERYONE.0)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load group preference chain: {}",
                e
            )))
        })?;
        chain.extend(group_rows.into_iter().map(PreferenceOverride::from));

        // Every user implicitly belongs to Everyone; no membership row needed
        if let Some(everyone) = self.load_group_prefs(GroupId::EVERYONE).await? {
            chain.push(everyone);
        }

        Ok(chain)
    }
}
