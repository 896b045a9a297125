//! Error types for activity-digest
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (Database, AuthorizationLookup, Mailer, etc.)
//! - A classification helper for transient failures that are safe to retry
//!   on the next scheduled batch run
//!
//! The digest scheduler is a background job with no end-user failure
//! surface: per-user failures are logged, the user is skipped for the
//! current run, and the next run retries automatically.

use thiserror::Error;

/// Result type alias for activity-digest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for activity-digest
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "min_topic_age_divisor")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// User not found
    ///
    /// Unknown user ids are skipped silently by the batch orchestrator;
    /// this variant only surfaces from direct storage lookups.
    #[error("user not found: {0}")]
    NotFound(String),

    /// Authorization lookup failed
    ///
    /// The scheduler fails closed on this error: the topic in question is
    /// treated as not visible and excluded from the digest.
    #[error("authorization lookup failed: {0}")]
    AuthorizationLookup(String),

    /// Mailer delivery error
    #[error("mailer error: {0}")]
    Mailer(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not starting new batch runs
    #[error("shutdown in progress: not starting new batch runs")]
    ShuttingDown,

    /// A batch run is already in progress (single-flight guard)
    #[error("batch run already in progress")]
    BatchInProgress,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl Error {
    /// Returns true if the error is transient and the per-user evaluation
    /// should be retried on the next scheduled run.
    ///
    /// Transient failures (connection problems, busy database) leave no
    /// partial state behind because per-user persistence is transactional,
    /// so the next batch run simply re-evaluates the user. Permanent
    /// failures (constraint violations, bad configuration) will not
    /// succeed on retry and should be investigated instead.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(e) => matches!(
                e,
                DatabaseError::ConnectionFailed(_) | DatabaseError::QueryFailed(_)
            ),
            Error::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let e = Error::Database(DatabaseError::ConnectionFailed("refused".into()));
        assert!(e.is_transient());

        let e = Error::Database(DatabaseError::ConstraintViolation("dup".into()));
        assert!(!e.is_transient());

        let e = Error::Config {
            message: "bad divisor".into(),
            key: Some("min_topic_age_divisor".into()),
        };
        assert!(!e.is_transient());

        assert!(!Error::NotFound("user 7".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let e = Error::AuthorizationLookup("category service unreachable".into());
        assert_eq!(
            e.to_string(),
            "authorization lookup failed: category service unreachable"
        );

        let e = Error::Database(DatabaseError::QueryFailed("locked".into()));
        assert_eq!(e.to_string(), "database error: query failed: locked");
    }
}
