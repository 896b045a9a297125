//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // Connect to database with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };

        // Run migrations
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        // Create schema version table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to read schema version: {}",
                        e
                    )))
                })?;
        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
            Self::record_version(&mut conn, 1).await?;
        }

        Ok(())
    }

    /// Initial schema: digest state, preferences, topics, visibility, log
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS user_stats (
                user_id INTEGER PRIMARY KEY,
                first_seen_at INTEGER,
                last_seen_at INTEGER NOT NULL,
                topics_new_since INTEGER NOT NULL,
                next_summary_at INTEGER
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_user_stats_next_summary
                ON user_stats (next_summary_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_prefs (
                user_id INTEGER PRIMARY KEY,
                interval_minutes INTEGER,
                send_even_if_active INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS group_prefs (
                group_id INTEGER PRIMARY KEY,
                interval_minutes INTEGER,
                send_even_if_active INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS group_members (
                group_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                page_id INTEGER PRIMARY KEY,
                author_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                category_id INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_topics_created_at
                ON topics (created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS topic_reads (
                user_id INTEGER NOT NULL,
                page_id INTEGER NOT NULL,
                read_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, page_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                category_id INTEGER PRIMARY KEY,
                restricted INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS category_access (
                category_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                PRIMARY KEY (category_id, group_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS digest_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                produced_at INTEGER NOT NULL,
                topic_count INTEGER NOT NULL,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_digest_log_user
                ON digest_log (user_id, produced_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS runtime_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&mut *conn).await.map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to apply v1 schema: {}",
                    e
                )))
            })?;
        }

        Ok(())
    }

    /// Record an applied schema version
    async fn record_version(conn: &mut SqliteConnection, version: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record schema version {}: {}",
                    version, e
                )))
            })?;
        Ok(())
    }

    /// Access the underlying connection pool
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool
    ///
    /// Waits for in-flight queries to finish and releases the file handles.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
