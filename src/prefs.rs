//! Layered digest-preference resolution.
//!
//! Effective settings are resolved per setting, not as a bundle: for each
//! field the first defined value along the chain
//! user → explicit groups (membership order) → Everyone → compiled-in
//! default wins. The walk is a plain option-coalescing fold over an
//! ordered list of overrides; there is no error path because the
//! compiled-in default terminates every lookup.
//!
//! Resolution results are cached per user in an explicit read-through
//! cache. Anything that writes preferences or memberships must invalidate
//! (per user where the scope is known, globally for group-level changes,
//! since memberships are not tracked in reverse).

use crate::db::Database;
use crate::error::Result;
use crate::types::{EffectivePrefs, PreferenceOverride, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Resolve effective settings from an ordered override chain
///
/// Pure helper; the chain excludes the compiled-in default, which this
/// function supplies. Always total.
pub fn coalesce(chain: &[PreferenceOverride]) -> EffectivePrefs {
    let default = EffectivePrefs::COMPILED_IN_DEFAULT;
    EffectivePrefs {
        interval: chain
            .iter()
            .find_map(|layer| layer.interval)
            .unwrap_or(default.interval),
        send_even_if_active: chain
            .iter()
            .find_map(|layer| layer.send_even_if_active)
            .unwrap_or(default.send_even_if_active),
    }
}

/// Resolves users' effective digest settings, with a read-through cache
pub struct PreferenceResolver {
    db: Arc<Database>,
    cache: RwLock<HashMap<UserId, EffectivePrefs>>,
}

impl PreferenceResolver {
    /// Create a resolver over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve one user's effective digest settings
    ///
    /// Returns the cached value when present; otherwise loads the override
    /// chain, coalesces, and caches. Storage errors propagate; the
    /// resolution itself cannot fail.
    pub async fn resolve(&self, user_id: UserId) -> Result<EffectivePrefs> {
        if let Some(prefs) = self.cache.read().await.get(&user_id) {
            return Ok(*prefs);
        }

        let chain = self.db.load_preference_chain(user_id).await?;
        let prefs = coalesce(&chain);

        self.cache.write().await.insert(user_id, prefs);
        Ok(prefs)
    }

    /// Drop one user's cached resolution
    ///
    /// Call after changing that user's overrides or group memberships.
    pub async fn invalidate_user(&self, user_id: UserId) {
        self.cache.write().await.remove(&user_id);
    }

    /// Drop all cached resolutions
    ///
    /// Call after changing group-level preferences (including the Everyone
    /// group): any user may inherit from the changed layer.
    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }
}
