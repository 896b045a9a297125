//! Batch digest orchestration.
//!
//! For each user in a batch: load stats, resolve preferences, run the
//! eligibility gate, and, when due, collect, select, persist, and hand
//! the summary to the mailer. The transactional cursor advance in the
//! persistence step is what guarantees at-most-one digest per
//! eligibility window per user; the single-flight guard on whole batch
//! runs only avoids wasted work, it is not needed for correctness.

use crate::authz::Authorization;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::mailer::Mailer;
use crate::prefs::PreferenceResolver;
use crate::types::{ActivitySummary, Event, UserId};
use crate::{eligibility, topics};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Orchestrates digest evaluation for batches of users
///
/// Cloneable: all fields are Arc-wrapped and clones share the same
/// single-flight guard and worker-pool limit.
#[derive(Clone)]
pub struct DigestScheduler {
    db: Arc<Database>,
    config: Arc<Config>,
    prefs: Arc<PreferenceResolver>,
    authz: Arc<dyn Authorization>,
    mailer: Arc<dyn Mailer>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Bounds how many users are evaluated concurrently within one run
    concurrent_limit: Arc<Semaphore>,
    /// Single-flight guard: true while a batch run is executing
    running: Arc<AtomicBool>,
}

/// Clears the single-flight flag when a batch run ends, however it ends
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DigestScheduler {
    /// Create a scheduler over the given collaborators
    pub(crate) fn new(
        db: Arc<Database>,
        config: Arc<Config>,
        prefs: Arc<PreferenceResolver>,
        authz: Arc<dyn Authorization>,
        mailer: Arc<dyn Mailer>,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        let workers = config.digest.max_concurrent_users.max(1);
        Self {
            db,
            config,
            prefs,
            authz,
            mailer,
            event_tx,
            concurrent_limit: Arc::new(Semaphore::new(workers)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Evaluate a batch of users at `now`
    ///
    /// Users are fanned out over a bounded worker pool; results come back
    /// in input order but no cross-user evaluation ordering is
    /// guaranteed. Per-user failures are logged and surface as `None`
    /// entries; the batch never aborts because one user failed, and a
    /// failed user is retried on the next scheduled run since nothing was
    /// committed for them.
    ///
    /// Returns [`Error::BatchInProgress`] if another batch run is
    /// currently executing (two overlapping full runs would be wasteful;
    /// per-user correctness does not depend on this guard).
    pub async fn process_batch(
        &self,
        user_ids: Vec<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(UserId, Option<ActivitySummary>)>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::BatchInProgress);
        }
        let _guard = RunGuard(self.running.clone());

        let evaluated = user_ids.len();
        debug!(users = evaluated, %now, "Starting batch run");

        let mut join_set = JoinSet::new();
        for (index, user_id) in user_ids.into_iter().enumerate() {
            let scheduler = self.clone();
            join_set.spawn(async move {
                // Closed only if the scheduler is dropped mid-run
                let _permit = match scheduler.concurrent_limit.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, user_id, None),
                };

                match scheduler.process_user(user_id, now).await {
                    Ok(summary) => (index, user_id, summary),
                    Err(e) => {
                        warn!(
                            user_id = %user_id,
                            error = %e,
                            transient = e.is_transient(),
                            "User evaluation failed, skipping until next run"
                        );
                        scheduler.emit_event(Event::UserSkipped {
                            user_id,
                            reason: e.to_string(),
                        });
                        (index, user_id, None)
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(evaluated);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "User evaluation task panicked"),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let results: Vec<(UserId, Option<ActivitySummary>)> = results
            .into_iter()
            .map(|(_, user_id, summary)| (user_id, summary))
            .collect();

        let produced = results.iter().filter(|(_, s)| s.is_some()).count();
        info!(evaluated, produced, "Batch run complete");
        self.emit_event(Event::BatchCompleted {
            evaluated,
            produced,
        });

        Ok(results)
    }

    /// Evaluate one user at `now`
    ///
    /// Returns the produced summary, or None when the user is unknown,
    /// not due, had no eligible content, or lost the eligibility window
    /// to a concurrent evaluation.
    pub async fn process_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<ActivitySummary>> {
        // Unknown or malformed user ids are skipped silently, not errors
        let Some(stats) = self.db.load_user_stats(user_id).await? else {
            debug!(user_id = %user_id, "No stats row, skipping");
            return Ok(None);
        };

        let prefs = self.prefs.resolve(user_id).await?;
        let decision = eligibility::evaluate(now, &stats, &prefs);

        if !decision.due {
            // Persist only the (possibly advanced) cooldown watermark
            if decision.stats.next_summary_at != stats.next_summary_at {
                match decision.stats.next_summary_at {
                    Some(next) => self.db.defer_next_summary(user_id, next).await?,
                    None => self.db.clear_next_summary(user_id).await?,
                }
            }
            return Ok(None);
        }

        // The gate never reports due for the do-not-send sentinel
        let min_age = prefs
            .interval
            .min_topic_age(self.config.digest.min_topic_age_divisor)
            .unwrap_or_else(chrono::Duration::zero);
        let next = eligibility::next_after_production(now, prefs.interval);

        let candidates = topics::collect(
            &self.db,
            self.authz.as_ref(),
            user_id,
            stats.topics_new_since,
            now,
            min_age,
        )
        .await?;

        if candidates.is_empty() {
            // Nothing to send, but the cooldown advances anyway. The cursor
            // moves only to the end of the considered window, so topics
            // still inside the minimum-age throttle stay ahead of it and
            // get their chance in the next digest.
            debug!(user_id = %user_id, "Due but no eligible topics");
            let window_end = now - min_age;
            self.db
                .advance_cursor(user_id, now, next, window_end, None)
                .await?;
            return Ok(None);
        }

        let considered = candidates.len();
        let selected = topics::select(candidates, self.config.digest.max_top_topics);
        let summary = ActivitySummary {
            user_id,
            topics: selected,
            generated_at: now,
        };

        // The cursor passes every considered candidate, selected or
        // dropped: capped-out topics are permanently skipped
        let won = self
            .db
            .advance_cursor(user_id, now, next, now, Some(&summary))
            .await?;
        if !won {
            debug!(
                user_id = %user_id,
                "Eligibility window already claimed by a concurrent evaluation"
            );
            return Ok(None);
        }

        info!(
            user_id = %user_id,
            included = summary.topics.len(),
            considered,
            "Digest produced"
        );

        // Fire and forget: delivery success is the transport's problem
        let mailer = self.mailer.clone();
        let outgoing = summary.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.deliver(&outgoing).await {
                warn!(
                    user_id = %outgoing.user_id,
                    mailer = mailer.name(),
                    error = %e,
                    "Summary delivery failed"
                );
            }
        });

        self.emit_event(Event::DigestProduced {
            user_id,
            topic_count: summary.topics.len(),
            generated_at: summary.generated_at,
        });

        Ok(Some(summary))
    }

    /// Users whose cooldown has elapsed at `now`
    pub(crate) async fn due_candidates(&self, now: DateTime<Utc>) -> Result<Vec<UserId>> {
        self.db.due_candidates(now).await
    }

    fn emit_event(&self, event: Event) {
        // send() fails when there are no subscribers, which is fine
        self.event_tx.send(event).ok();
    }
}
