//! Time-based eligibility gating for digest production.
//!
//! The gate is a pure function over an injected "now": given a user's
//! persisted digest state and their resolved preferences, it decides
//! whether a digest run is due and what the updated state should be.
//! Keeping it pure is what makes the whole scheduler testable under a
//! simulated clock.
//!
//! Decision order:
//! 1. Do-not-send interval: never due; the cooldown watermark is cleared.
//! 2. Cooldown still running: not due; state untouched.
//! 3. Never evaluated before (no watermark): not due until a full
//!    interval has passed since the account baseline. This gives newly
//!    created users a full-interval grace period before their first
//!    possible digest.
//! 4. Due by time, but the user was active within the interval window and
//!    their settings suppress digests while active: not due; the
//!    watermark advances so near-term re-evaluation doesn't thrash, but
//!    the topic cursor does not move.
//! 5. Otherwise: due.
//!
//! On every not-due path that writes, the watermark is set to
//! `max(existing, now + interval)` so it only ever moves forward.

use crate::types::{DigestInterval, EffectivePrefs, UserStats};
use chrono::{DateTime, Utc};

/// Outcome of one eligibility evaluation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Whether a digest run is due now
    pub due: bool,
    /// The stats as they should be persisted for this evaluation
    ///
    /// Equal to the input stats when nothing needs to change. When `due`
    /// is true this still holds the *pre-production* state; the scheduler
    /// sets the post-production watermark and cursor itself, atomically
    /// with the digest-log marker.
    pub stats: UserStats,
}

/// Decide whether a digest run is due for one user at `now`
pub fn evaluate(now: DateTime<Utc>, stats: &UserStats, prefs: &EffectivePrefs) -> Decision {
    let interval = match prefs.interval.as_duration() {
        Some(interval) => interval,
        None => {
            // Digests disabled: clear the watermark so a later re-enable
            // starts from a clean "never evaluated" baseline
            let mut updated = stats.clone();
            updated.next_summary_at = None;
            return Decision {
                due: false,
                stats: updated,
            };
        }
    };

    match stats.next_summary_at {
        Some(next) if now < next => {
            // Cooldown active
            Decision {
                due: false,
                stats: stats.clone(),
            }
        }
        Some(_) => {
            if suppressed_by_activity(now, stats, prefs, interval) {
                Decision {
                    due: false,
                    stats: deferred(stats, now + interval),
                }
            } else {
                Decision {
                    due: true,
                    stats: stats.clone(),
                }
            }
        }
        None => {
            // First evaluation ever: full-interval grace period from the
            // account baseline
            let baseline = stats.first_seen_at.unwrap_or(stats.last_seen_at);
            if now < baseline + interval {
                Decision {
                    due: false,
                    stats: deferred(stats, baseline + interval),
                }
            } else if suppressed_by_activity(now, stats, prefs, interval) {
                Decision {
                    due: false,
                    stats: deferred(stats, now + interval),
                }
            } else {
                Decision {
                    due: true,
                    stats: stats.clone(),
                }
            }
        }
    }
}

/// Whether recent activity suppresses this window's digest
fn suppressed_by_activity(
    now: DateTime<Utc>,
    stats: &UserStats,
    prefs: &EffectivePrefs,
    interval: chrono::Duration,
) -> bool {
    !prefs.send_even_if_active && stats.last_seen_at > now - interval
}

/// Stats with the cooldown watermark pushed forward (never backward)
fn deferred(stats: &UserStats, next: DateTime<Utc>) -> UserStats {
    let mut updated = stats.clone();
    updated.next_summary_at = Some(match stats.next_summary_at {
        Some(existing) if existing > next => existing,
        _ => next,
    });
    updated
}

/// The post-production watermark once a digest decision was carried out
///
/// Applied unconditionally when the gate said due, whether or not the
/// resulting content set turned out to be empty: the cooldown advances
/// either way.
pub fn next_after_production(now: DateTime<Utc>, interval: DigestInterval) -> DateTime<Utc> {
    match interval.as_duration() {
        Some(d) => now + d,
        None => now,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn new_user_stats() -> UserStats {
        UserStats {
            user_id: UserId(1),
            first_seen_at: Some(t0()),
            last_seen_at: t0(),
            topics_new_since: t0(),
            next_summary_at: None,
        }
    }

    fn daily_prefs() -> EffectivePrefs {
        EffectivePrefs {
            interval: DigestInterval::DAILY,
            send_even_if_active: true,
        }
    }

    #[test]
    fn test_do_not_send_never_due() {
        let prefs = EffectivePrefs {
            interval: DigestInterval::DoNotSend,
            send_even_if_active: true,
        };
        let mut stats = new_user_stats();
        stats.next_summary_at = Some(t0() + Duration::hours(1));

        // Not due for any now, and the watermark is cleared
        for hours in [0, 1, 24, 24 * 365] {
            let decision = evaluate(t0() + Duration::hours(hours), &stats, &prefs);
            assert!(!decision.due);
            assert!(decision.stats.next_summary_at.is_none());
        }
    }

    #[test]
    fn test_first_run_grace_period() {
        let stats = new_user_stats();
        let prefs = daily_prefs();

        // 23h after account creation: inside the grace period
        let decision = evaluate(t0() + Duration::hours(23), &stats, &prefs);
        assert!(!decision.due);
        assert_eq!(
            decision.stats.next_summary_at,
            Some(t0() + Duration::hours(24))
        );

        // 25h after: grace period over, due
        let decision = evaluate(t0() + Duration::hours(25), &stats, &prefs);
        assert!(decision.due);
    }

    #[test]
    fn test_grace_period_falls_back_to_last_seen() {
        let mut stats = new_user_stats();
        stats.first_seen_at = None;
        stats.last_seen_at = t0() + Duration::hours(6);
        let prefs = daily_prefs();

        let decision = evaluate(t0() + Duration::hours(24), &stats, &prefs);
        assert!(!decision.due, "baseline is last_seen_at when first_seen_at is absent");

        let decision = evaluate(t0() + Duration::hours(31), &stats, &prefs);
        assert!(decision.due);
    }

    #[test]
    fn test_cooldown_blocks_until_elapsed() {
        let mut stats = new_user_stats();
        stats.next_summary_at = Some(t0() + Duration::hours(24));
        let prefs = daily_prefs();

        let decision = evaluate(t0() + Duration::hours(12), &stats, &prefs);
        assert!(!decision.due);
        // Stats untouched on the cooldown path
        assert_eq!(decision.stats, stats);

        let decision = evaluate(t0() + Duration::hours(24), &stats, &prefs);
        assert!(decision.due);
    }

    #[test]
    fn test_activity_suppression() {
        let now = t0() + Duration::hours(48);
        let mut stats = new_user_stats();
        stats.next_summary_at = Some(t0() + Duration::hours(24));
        stats.last_seen_at = now - Duration::hours(2);

        let prefs = EffectivePrefs {
            interval: DigestInterval::DAILY,
            send_even_if_active: false,
        };

        let decision = evaluate(now, &stats, &prefs);
        assert!(!decision.due, "seen 2h ago within a 24h interval");
        // Watermark advances, cursor does not
        assert_eq!(decision.stats.next_summary_at, Some(now + Duration::hours(24)));
        assert_eq!(decision.stats.topics_new_since, stats.topics_new_since);

        // Same state but the user opted into digests-while-active
        let decision = evaluate(now, &stats, &daily_prefs());
        assert!(decision.due);
    }

    #[test]
    fn test_inactive_user_not_suppressed() {
        let now = t0() + Duration::hours(72);
        let mut stats = new_user_stats();
        stats.next_summary_at = Some(t0() + Duration::hours(24));
        stats.last_seen_at = now - Duration::hours(30);

        let prefs = EffectivePrefs {
            interval: DigestInterval::DAILY,
            send_even_if_active: false,
        };

        assert!(evaluate(now, &stats, &prefs).due);
    }

    #[test]
    fn test_deferral_is_monotonic() {
        let mut stats = new_user_stats();
        // Watermark already far in the future (e.g. set by a longer
        // interval that has since been shortened)
        stats.next_summary_at = Some(t0() + Duration::days(7));
        stats.last_seen_at = t0() + Duration::days(6);

        let prefs = EffectivePrefs {
            interval: DigestInterval::DAILY,
            send_even_if_active: false,
        };

        // Not due (cooldown active); nothing may move the watermark back
        let decision = evaluate(t0() + Duration::days(6), &stats, &prefs);
        assert!(!decision.due);
        assert_eq!(decision.stats.next_summary_at, Some(t0() + Duration::days(7)));
    }

    #[test]
    fn test_next_after_production() {
        assert_eq!(
            next_after_production(t0(), DigestInterval::DAILY),
            t0() + Duration::hours(24)
        );
    }
}
