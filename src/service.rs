//! Top-level service facade.
//!
//! [`DigestService`] owns the database, the preference resolver, and the
//! scheduler, and exposes the narrow write surface an embedding platform
//! calls into (user lifecycle, activity, topics, preferences). It is the
//! single place where preference writes and cache invalidation are tied
//! together.

use crate::authz::{Authorization, CategoryAuthorizer};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{Database, DigestLogRow};
use crate::error::Result;
use crate::mailer::{Mailer, NoOpMailer, WebhookMailer};
use crate::prefs::PreferenceResolver;
use crate::scheduler::DigestScheduler;
use crate::scheduler_task::SchedulerTask;
use crate::types::{ActivitySummary, Event, GroupId, PreferenceOverride, TopicMeta, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the broadcast event channel
const EVENT_CHANNEL_SIZE: usize = 1000;

/// The activity-digest service
///
/// Cloneable handle; clones share the same database, caches, and event
/// channel. Construct with [`DigestService::new`] for production
/// collaborators, or [`DigestService::with_collaborators`] to inject a
/// simulated clock, custom authorization, or a test mailer.
#[derive(Clone)]
pub struct DigestService {
    db: Arc<Database>,
    config: Arc<Config>,
    prefs: Arc<PreferenceResolver>,
    scheduler: DigestScheduler,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

impl DigestService {
    /// Create the service with production collaborators
    ///
    /// Wall-clock time, category-based authorization against the local
    /// tables, and the webhook mailer when one is configured (otherwise
    /// deliveries are dropped).
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_collaborators(config, Arc::new(SystemClock), None, None).await
    }

    /// Create the service with injected collaborators
    ///
    /// `None` falls back to the production default for that collaborator.
    /// Opens (and migrates) the database, then records the start for
    /// unclean-shutdown detection.
    pub async fn with_collaborators(
        config: Config,
        clock: Arc<dyn Clock>,
        authorization: Option<Arc<dyn Authorization>>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        if db.was_unclean_shutdown().await? {
            warn!("Previous session did not shut down cleanly");
        }
        db.set_clean_start().await?;

        let authz = authorization
            .unwrap_or_else(|| Arc::new(CategoryAuthorizer::new(db.clone())) as Arc<dyn Authorization>);
        let mailer = mailer.unwrap_or_else(|| match WebhookMailer::from_config(&config.mailer) {
            Some(webhook) => Arc::new(webhook) as Arc<dyn Mailer>,
            None => Arc::new(NoOpMailer) as Arc<dyn Mailer>,
        });

        let config = Arc::new(config);
        let prefs = Arc::new(PreferenceResolver::new(db.clone()));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let scheduler = DigestScheduler::new(
            db.clone(),
            config.clone(),
            prefs.clone(),
            authz,
            mailer,
            event_tx.clone(),
        );

        info!(
            database = %config.persistence.database_path.display(),
            batch_tick_secs = config.digest.batch_tick.as_secs(),
            "Digest service initialized"
        );

        Ok(Self {
            db,
            config,
            prefs,
            scheduler,
            clock,
            event_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to service events
    ///
    /// Slow subscribers that fall more than the channel capacity behind
    /// miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Direct access to the persistence layer
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Spawn the periodic batch scheduler
    ///
    /// Runs until [`shutdown`](Self::shutdown) is called. Calling this
    /// more than once spawns additional tick loops; the single-flight
    /// guard keeps their batch runs from overlapping.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let task = SchedulerTask::new(
            self.scheduler.clone(),
            self.db.clone(),
            self.clock.clone(),
            self.config.digest.batch_tick,
            self.shutdown.clone(),
        );
        tokio::spawn(task.run())
    }

    /// Evaluate all currently due users once, immediately
    ///
    /// The same work a scheduler tick does, on demand. Useful for
    /// embedders that drive the cadence themselves and for simulated-time
    /// tests.
    pub async fn run_batch(&self) -> Result<Vec<(UserId, Option<ActivitySummary>)>> {
        let now = self.clock.now();
        let due = self.scheduler.due_candidates(now).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        self.scheduler.process_batch(due, now).await
    }

    /// Evaluate one user immediately, bypassing the due-candidate query
    ///
    /// The eligibility gate still applies; this cannot force a digest.
    pub async fn evaluate_user(&self, user_id: UserId) -> Result<Option<ActivitySummary>> {
        self.scheduler.process_user(user_id, self.clock.now()).await
    }

    /// Register a new user with the digest system
    ///
    /// Idempotent. The user starts in the full-interval grace period: no
    /// digest until at least one effective interval after this call.
    pub async fn create_user(&self, user_id: UserId) -> Result<()> {
        self.db.seed_user_stats(user_id, self.clock.now()).await
    }

    /// Record that a user was active just now (page view, post, login)
    pub async fn record_user_seen(&self, user_id: UserId) -> Result<()> {
        self.db.record_user_seen(user_id, self.clock.now()).await
    }

    /// Register a newly created topic
    pub async fn post_topic(&self, topic: &TopicMeta) -> Result<()> {
        self.db.insert_topic(topic).await
    }

    /// Record that a user has read a topic
    ///
    /// Read topics never appear in that user's digests.
    pub async fn mark_topic_read(&self, user_id: UserId, page_id: crate::types::PageId) -> Result<()> {
        self.db.mark_topic_read(user_id, page_id, self.clock.now()).await
    }

    /// Set a user's preference overrides
    pub async fn set_user_prefs(&self, user_id: UserId, prefs: PreferenceOverride) -> Result<()> {
        self.db.set_user_prefs(user_id, prefs).await?;
        self.prefs.invalidate_user(user_id).await;
        Ok(())
    }

    /// Remove a user's preference overrides, falling back to group layers
    pub async fn clear_user_prefs(&self, user_id: UserId) -> Result<()> {
        self.db.clear_user_prefs(user_id).await?;
        self.prefs.invalidate_user(user_id).await;
        Ok(())
    }

    /// Set a group's default preference overrides
    ///
    /// Invalidates every cached resolution: any user may inherit from the
    /// changed layer.
    pub async fn set_group_prefs(&self, group_id: GroupId, prefs: PreferenceOverride) -> Result<()> {
        self.db.set_group_prefs(group_id, prefs).await?;
        self.prefs.invalidate_all().await;
        Ok(())
    }

    /// Add a user to a group at the given position in their chain
    ///
    /// Lower positions take precedence during resolution.
    pub async fn add_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
        position: i32,
    ) -> Result<()> {
        self.db.add_group_member(group_id, user_id, position).await?;
        self.prefs.invalidate_user(user_id).await;
        Ok(())
    }

    /// Remove a user from a group
    pub async fn remove_group_member(&self, group_id: GroupId, user_id: UserId) -> Result<()> {
        self.db.remove_group_member(group_id, user_id).await?;
        self.prefs.invalidate_user(user_id).await;
        Ok(())
    }

    /// A user's digest production history, newest first
    pub async fn digest_history(&self, user_id: UserId, limit: i64) -> Result<Vec<DigestLogRow>> {
        self.db.digest_history(user_id, limit).await
    }

    /// Shut the service down cleanly
    ///
    /// Stops spawned scheduler loops, records the clean shutdown, and
    /// closes the connection pool. Other clones of this service become
    /// unusable afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down digest service");
        self.shutdown.cancel();
        self.db.set_clean_shutdown().await?;
        self.db.close().await;
        Ok(())
    }
}
