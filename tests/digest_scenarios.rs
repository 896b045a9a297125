//! End-to-end digest scenarios driven by a simulated clock.
//!
//! Each test builds a real service over a temporary SQLite database,
//! steps time forward, and asserts on the summaries the scheduler
//! produces (and on the ones it must not produce).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use activity_digest::{
    ActivitySummary, AllowAllAuthorizer, Authorization, CategoryId, Clock, Config, DigestInterval,
    DigestService, Mailer, PageId, PreferenceOverride, RecordingMailer, SimulatedClock, TopicMeta,
    UserId,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

const AUTHOR: UserId = UserId(99);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

struct Harness {
    service: DigestService,
    clock: Arc<SimulatedClock>,
    mailer: Arc<RecordingMailer>,
    _tmp: TempDir,
}

impl Harness {
    /// Service with an allow-all authorizer and a recording mailer
    async fn new() -> Self {
        Self::with_authorizer(Some(Arc::new(AllowAllAuthorizer))).await
    }

    /// Service with the given authorizer (None = production category rules)
    async fn with_authorizer(authz: Option<Arc<dyn Authorization>>) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.persistence.database_path = tmp.path().join("digest.db");

        let clock = Arc::new(SimulatedClock::new(t0()));
        let mailer = Arc::new(RecordingMailer::new());
        let service = DigestService::with_collaborators(
            config,
            clock.clone(),
            authz,
            Some(mailer.clone() as Arc<dyn Mailer>),
        )
        .await
        .unwrap();

        Self {
            service,
            clock,
            mailer,
            _tmp: tmp,
        }
    }

    async fn create_user(&self, user: UserId, interval: DigestInterval, even_if_active: bool) {
        self.service.create_user(user).await.unwrap();
        self.service
            .set_user_prefs(
                user,
                PreferenceOverride {
                    interval: Some(interval),
                    send_even_if_active: Some(even_if_active),
                },
            )
            .await
            .unwrap();
    }

    async fn post_topic(&self, page: i64, author: UserId, at: DateTime<Utc>) {
        self.service
            .post_topic(&TopicMeta {
                page_id: PageId(page),
                author_id: author,
                created_at: at,
                category_id: CategoryId(1),
            })
            .await
            .unwrap();
    }

    async fn evaluate(&self, user: UserId) -> Option<ActivitySummary> {
        self.service.evaluate_user(user).await.unwrap()
    }
}

fn pages(summary: &ActivitySummary) -> Vec<i64> {
    summary.topics.iter().map(|t| t.page_id.0).collect()
}

#[tokio::test]
async fn first_digest_waits_a_full_interval() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;

    // Someone else posts an hour in; the user posts their own topic too
    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;
    h.post_topic(11, user, t0() + Duration::hours(1)).await;

    // 23h after signup: still inside the grace period
    h.clock.set(t0() + Duration::hours(23));
    assert!(h.evaluate(user).await.is_none());

    // 25h after signup: due, and the digest excludes the user's own topic
    h.clock.set(t0() + Duration::hours(25));
    let summary = h.evaluate(user).await.expect("digest after grace period");
    assert_eq!(pages(&summary), vec![10]);
    assert_eq!(summary.generated_at, t0() + Duration::hours(25));

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn daily_and_weekly_users_diverge() {
    let h = Harness::new().await;
    let daily = UserId(1);
    let weekly = UserId(2);
    h.create_user(daily, DigestInterval::DAILY, true).await;
    h.create_user(weekly, DigestInterval::WEEKLY, true).await;

    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;

    // First batch after a day: only the daily user gets a digest
    h.clock.set(t0() + Duration::hours(25));
    let results = h.service.run_batch().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_some(), "daily user is due");
    assert!(results[1].1.is_none(), "weekly user still in grace period");

    // Another topic lands mid-week
    h.post_topic(11, AUTHOR, t0() + Duration::days(3)).await;

    // A week in, one batch run serves both: the daily user gets only the
    // topic newer than their cursor, the weekly user everything since
    // their older cursor
    h.clock.set(t0() + Duration::days(7) + Duration::hours(1));
    let results = h.service.run_batch().await.unwrap();
    let daily_summary = results[0].1.as_ref().expect("daily digest");
    assert_eq!(pages(daily_summary), vec![11]);
    let weekly_summary = results[1].1.as_ref().expect("weekly digest");
    assert_eq!(pages(weekly_summary), vec![11, 10]);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn group_defaults_inherit_and_override() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.service.create_user(user).await.unwrap();

    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;

    // No overrides anywhere: the compiled-in default is do-not-send
    h.clock.set(t0() + Duration::days(30));
    assert!(h.evaluate(user).await.is_none());

    // Platform-wide daily default via the Everyone group
    h.service
        .set_group_prefs(
            activity_digest::GroupId::EVERYONE,
            PreferenceOverride {
                interval: Some(DigestInterval::DAILY),
                send_even_if_active: Some(true),
            },
        )
        .await
        .unwrap();

    // The account is long past its grace period, so the inherited daily
    // setting takes effect immediately
    let summary = h.evaluate(user).await.expect("inherited daily digest");
    assert_eq!(pages(&summary), vec![10]);

    // A user-level opt-out beats the group default
    h.service
        .set_user_prefs(
            user,
            PreferenceOverride {
                interval: Some(DigestInterval::DoNotSend),
                send_even_if_active: None,
            },
        )
        .await
        .unwrap();
    h.post_topic(11, AUTHOR, h.clock.now()).await;
    h.clock.advance(Duration::days(10));
    assert!(h.evaluate(user).await.is_none());

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn cap_drops_excess_topics_permanently() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;

    // 15 candidate topics, posted a minute apart
    for i in 0..15 {
        h.post_topic(100 + i, AUTHOR, t0() + Duration::hours(1) + Duration::minutes(i))
            .await;
    }

    h.clock.set(t0() + Duration::hours(25));
    let summary = h.evaluate(user).await.expect("capped digest");
    assert_eq!(summary.topics.len(), 10);
    // Newest first, so pages 105..=114 in reverse
    assert_eq!(pages(&summary), (105..115).rev().collect::<Vec<i64>>());

    // The 5 dropped topics never reappear: the next window is empty
    h.clock.set(t0() + Duration::hours(50));
    assert!(h.evaluate(user).await.is_none());

    // And only one digest was ever logged
    let history = h.service.digest_history(user, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].topic_count, 10);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn recent_activity_suppresses_digest() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, false).await;

    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;

    // The user visits the site an hour before they would be due
    h.clock.set(t0() + Duration::hours(24));
    h.service.record_user_seen(user).await.unwrap();

    h.clock.set(t0() + Duration::hours(25));
    assert!(h.evaluate(user).await.is_none(), "active 1h ago, suppressed");

    // Suppression deferred, it did not consume the topic: once the user
    // has been away a full interval the digest arrives with it
    h.clock.set(t0() + Duration::hours(50));
    let summary = h.evaluate(user).await.expect("digest after going quiet");
    assert_eq!(pages(&summary), vec![10]);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn fresh_topics_wait_out_the_minimum_age() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;

    // Posted 1h before the evaluation; the daily throttle demands 6h
    h.post_topic(10, AUTHOR, t0() + Duration::hours(24)).await;

    h.clock.set(t0() + Duration::hours(25));
    assert!(h.evaluate(user).await.is_none(), "topic too fresh");

    // The cooldown advanced anyway; the next evaluation picks it up
    h.clock.set(t0() + Duration::hours(49));
    let summary = h.evaluate(user).await.expect("aged topic digest");
    assert_eq!(pages(&summary), vec![10]);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn read_topics_never_appear() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;

    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;
    h.post_topic(11, AUTHOR, t0() + Duration::hours(2)).await;
    h.service
        .mark_topic_read(user, PageId(11))
        .await
        .unwrap();

    h.clock.set(t0() + Duration::hours(25));
    let summary = h.evaluate(user).await.expect("digest");
    assert_eq!(pages(&summary), vec![10]);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn consecutive_digests_are_at_least_an_interval_apart() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;

    // Five days of hourly ticks, a fresh topic every 10 hours
    for hour in 1..=120 {
        h.clock.set(t0() + Duration::hours(hour));
        if hour % 10 == 0 {
            h.post_topic(1000 + hour, AUTHOR, h.clock.now()).await;
        }
        h.service.run_batch().await.unwrap();
    }

    let history = h.service.digest_history(user, 50).await.unwrap();
    assert!(history.len() >= 2, "expected multiple digests over 5 days");

    // History is newest first; every consecutive pair is >= 24h apart
    for pair in history.windows(2) {
        assert!(
            pair[0].produced_at - pair[1].produced_at >= 24 * 3600,
            "digests {} and {} closer than the interval",
            pair[1].produced_at,
            pair[0].produced_at
        );
    }

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn restricted_categories_are_filtered() {
    // Production authorizer: category rules from the local tables
    let h = Harness::with_authorizer(None).await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;

    let db = h.service.database();
    db.upsert_category(CategoryId(1), false).await.unwrap();
    db.upsert_category(CategoryId(2), true).await.unwrap();

    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;
    h.service
        .post_topic(&TopicMeta {
            page_id: PageId(11),
            author_id: AUTHOR,
            created_at: t0() + Duration::hours(1),
            category_id: CategoryId(2),
        })
        .await
        .unwrap();
    // Unknown category: fails closed, excluded like a restricted one
    h.service
        .post_topic(&TopicMeta {
            page_id: PageId(12),
            author_id: AUTHOR,
            created_at: t0() + Duration::hours(1),
            category_id: CategoryId(3),
        })
        .await
        .unwrap();

    h.clock.set(t0() + Duration::hours(25));
    let summary = h.evaluate(user).await.expect("digest");
    assert_eq!(pages(&summary), vec![10]);

    h.service.shutdown().await.unwrap();
}

#[tokio::test]
async fn produced_summaries_reach_the_mailer() {
    let h = Harness::new().await;
    let user = UserId(1);
    h.create_user(user, DigestInterval::DAILY, true).await;
    h.post_topic(10, AUTHOR, t0() + Duration::hours(1)).await;

    h.clock.set(t0() + Duration::hours(25));
    assert!(h.evaluate(user).await.is_some());

    // Delivery is fire-and-forget; give the spawned task a moment
    for _ in 0..50 {
        if !h.mailer.delivered_for(user).await.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let delivered = h.mailer.delivered_for(user).await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(pages(&delivered[0]), vec![10]);

    h.service.shutdown().await.unwrap();
}
