//! Periodic batch-run loop.

use crate::clock::Clock;
use crate::db::Database;
use crate::error::Error;
use crate::scheduler::DigestScheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background task that periodically evaluates all due users
///
/// Every tick it asks the persistence layer for the users whose cooldown
/// has elapsed and runs them through the scheduler. Ticks that find no
/// due users are cheap; a tick that overlaps a still-running batch is
/// skipped rather than queued.
pub struct SchedulerTask {
    scheduler: DigestScheduler,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    shutdown: CancellationToken,
}

impl SchedulerTask {
    /// Create the task; it does nothing until [`run`](Self::run) is awaited
    pub(crate) fn new(
        scheduler: DigestScheduler,
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        tick: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            db,
            clock,
            tick,
            shutdown,
        }
    }

    /// Run the tick loop until the shutdown token fires
    pub async fn run(self) {
        info!(tick_secs = self.tick.as_secs(), "Digest scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Digest scheduler shutting down");
                    break;
                }
                _ = sleep(self.tick) => {}
            }

            let now = self.clock.now();
            let due = match self.db.due_candidates(now).await {
                Ok(due) => due,
                Err(e) => {
                    error!(error = %e, "Failed to query due users, will retry next tick");
                    continue;
                }
            };

            if due.is_empty() {
                debug!(%now, "No users due");
                continue;
            }

            match self.scheduler.process_batch(due, now).await {
                Ok(results) => {
                    let produced = results.iter().filter(|(_, s)| s.is_some()).count();
                    debug!(evaluated = results.len(), produced, "Scheduled run finished");
                }
                Err(Error::BatchInProgress) => {
                    warn!("Previous batch still running, skipping this tick");
                }
                Err(e) => {
                    error!(error = %e, "Batch run failed");
                }
            }
        }
    }
}
