//! Topic visibility authorization.
//!
//! The permission engine is an external collaborator consumed as a
//! capability: the scheduler only asks "may this user see this topic?".
//! A lookup failure always fails closed: the topic is excluded rather
//! than risking a leak into an email.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{TopicMeta, UserId};
use async_trait::async_trait;
use std::sync::Arc;

/// Decides whether a user may see a topic (trait object for pluggable
/// permission engines)
#[async_trait]
pub trait Authorization: Send + Sync {
    /// Whether `user_id` may see the page behind `topic`
    ///
    /// Implementations should return an error (not `Ok(false)`) for
    /// lookup failures so callers can distinguish "denied" from
    /// "unknown"; the collector treats both as not visible.
    async fn may_user_see_page(&self, user_id: UserId, topic: &TopicMeta) -> Result<bool>;

    /// Name of this implementation, for logging
    fn name(&self) -> &'static str;
}

/// Authorization that permits everything
///
/// For embedders whose platform has no visibility rules, and for tests.
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorization for AllowAllAuthorizer {
    async fn may_user_see_page(&self, _user_id: UserId, _topic: &TopicMeta) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "allow-all"
    }
}

/// Category-table backed authorization
///
/// A topic is visible when its category is unrestricted, or when one of
/// the user's groups (or the Everyone group) has been granted access.
/// Unknown categories are treated as restricted.
pub struct CategoryAuthorizer {
    db: Arc<Database>,
}

impl CategoryAuthorizer {
    /// Create an authorizer over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authorization for CategoryAuthorizer {
    async fn may_user_see_page(&self, user_id: UserId, topic: &TopicMeta) -> Result<bool> {
        let restricted = self
            .db
            .is_category_restricted(topic.category_id)
            .await
            .map_err(|e| Error::AuthorizationLookup(e.to_string()))?;
        if !restricted {
            return Ok(true);
        }

        self.db
            .user_has_category_access(user_id, topic.category_id)
            .await
            .map_err(|e| Error::AuthorizationLookup(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "category"
    }
}
