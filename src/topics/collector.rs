//! Candidate topic collection for one user's digest window.

use crate::authz::Authorization;
use crate::db::Database;
use crate::error::Result;
use crate::types::{TopicMeta, UserId};
use chrono::{DateTime, Duration, Utc};

/// Gather the candidate topics for one user
///
/// Returns topics created in `[since, now - min_age]` that the user has
/// not read and did not author, filtered through the authorization
/// collaborator. The upper bound is the minimum-age throttle: a topic
/// must have existed for `interval / min_topic_age_divisor` before it may
/// be emailed, so other readers and processes get a window to act first.
///
/// Output is ascending by creation time; final ordering is the
/// selector's responsibility.
///
/// An authorization failure for a single topic excludes that topic (fail
/// closed) without failing the whole collection.
pub async fn collect(
    db: &Database,
    authz: &dyn Authorization,
    user_id: UserId,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    min_age: Duration,
) -> Result<Vec<TopicMeta>> {
    let until = now - min_age;
    if until < since {
        // The whole window is younger than the throttle allows
        return Ok(Vec::new());
    }

    let candidates = db.unread_candidate_topics(user_id, since, until).await?;

    let mut visible = Vec::with_capacity(candidates.len());
    for topic in candidates {
        match authz.may_user_see_page(user_id, &topic).await {
            Ok(true) => visible.push(topic),
            Ok(false) => {}
            Err(e) => {
                // Fail closed: exclude the topic rather than risk leaking
                // restricted content into an email
                tracing::warn!(
                    user_id = %user_id,
                    page_id = %topic.page_id,
                    authorizer = authz.name(),
                    error = %e,
                    "Authorization lookup failed, excluding topic"
                );
            }
        }
    }

    Ok(visible)
}
