//! Core types for activity-digest

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new UserId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a group
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl GroupId {
    /// The universal "Everyone" group every user implicitly belongs to.
    ///
    /// Preference resolution consults this group last, after the user's
    /// explicit groups and before the compiled-in default.
    pub const EVERYONE: GroupId = GroupId(0);

    /// Create a new GroupId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a topic page
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub i64);

impl PageId {
    /// Create a new PageId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a category
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl CategoryId {
    /// Create a new CategoryId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

/// How often a user receives activity digests
///
/// `DoNotSend` is the sentinel that disables digests entirely. In the
/// database it is stored as `0`; a NULL column means "inherit from the
/// next layer" and maps to `None` at the [`PreferenceOverride`] level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum DigestInterval {
    /// Never send digests
    DoNotSend,
    /// Send at most one digest per this many minutes
    Minutes(u32),
}

impl DigestInterval {
    /// Daily digests
    pub const DAILY: DigestInterval = DigestInterval::Minutes(60 * 24);
    /// Weekly digests
    pub const WEEKLY: DigestInterval = DigestInterval::Minutes(60 * 24 * 7);

    /// The interval as a duration, or None for `DoNotSend`
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            DigestInterval::DoNotSend => None,
            DigestInterval::Minutes(m) => Some(Duration::minutes(i64::from(m))),
        }
    }

    /// The minimum topic age enforced before a topic may appear in a digest.
    ///
    /// Computed as `interval / divisor` so that fresh topics get a window
    /// in which other readers and processes can act first.
    pub fn min_topic_age(self, divisor: u32) -> Option<Duration> {
        let interval = self.as_duration()?;
        let divisor = i64::from(divisor.max(1));
        Some(Duration::seconds(interval.num_seconds() / divisor))
    }
}

impl From<i64> for DigestInterval {
    fn from(minutes: i64) -> Self {
        if minutes <= 0 {
            DigestInterval::DoNotSend
        } else {
            DigestInterval::Minutes(minutes.min(i64::from(u32::MAX)) as u32)
        }
    }
}

impl From<DigestInterval> for i64 {
    fn from(interval: DigestInterval) -> Self {
        match interval {
            DigestInterval::DoNotSend => 0,
            DigestInterval::Minutes(m) => i64::from(m),
        }
    }
}

impl fmt::Display for DigestInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestInterval::DoNotSend => write!(f, "do-not-send"),
            DigestInterval::Minutes(m) => write!(f, "{}m", m),
        }
    }
}

/// Per-user digest bookkeeping record
///
/// Created when the user account is created and mutated only by the
/// scheduler's persistence step. `topics_new_since` is the cursor: topics
/// created at or after this instant are considered new and unprocessed.
/// `next_summary_at` is the cooldown watermark; it is `None` only before
/// the very first evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserStats {
    /// The user this record belongs to
    pub user_id: UserId,
    /// When the user account was created (baseline for the first-run grace period)
    pub first_seen_at: Option<DateTime<Utc>>,
    /// When the user was last active on the platform
    pub last_seen_at: DateTime<Utc>,
    /// Cursor: topics created at/after this instant are new and unprocessed
    pub topics_new_since: DateTime<Utc>,
    /// Earliest instant the next digest may be produced (None = never evaluated)
    pub next_summary_at: Option<DateTime<Utc>>,
}

/// Optional digest-setting overrides at one scope (user or group)
///
/// `None` means "inherit from the next layer in the chain".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreferenceOverride {
    /// Override for the digest interval
    pub interval: Option<DigestInterval>,
    /// Override for whether digests are sent even to recently active users
    pub send_even_if_active: Option<bool>,
}

/// Fully resolved digest settings for one user
///
/// Derived on every evaluation from the override chain
/// (user → explicit groups → Everyone → compiled-in default); never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectivePrefs {
    /// How often digests may be sent (`DoNotSend` disables them)
    pub interval: DigestInterval,
    /// Send a digest even if the user was active within the interval window
    pub send_even_if_active: bool,
}

impl EffectivePrefs {
    /// The compiled-in default at the bottom of the override chain:
    /// no digests, and recently active users are not emailed.
    pub const COMPILED_IN_DEFAULT: EffectivePrefs = EffectivePrefs {
        interval: DigestInterval::DoNotSend,
        send_even_if_active: false,
    };
}

/// Metadata for one candidate topic
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMeta {
    /// The topic's page id
    pub page_id: PageId,
    /// Who created the topic
    pub author_id: UserId,
    /// When the topic was created
    pub created_at: DateTime<Utc>,
    /// The category the topic lives in (visibility is decided by the
    /// authorization collaborator)
    pub category_id: CategoryId,
}

/// The output artifact of one due evaluation: an ordered, capped set of
/// new topics for one user, handed to the mailer for delivery.
///
/// A summary with zero topics is never built; eligibility plus empty
/// content yields no summary (the cooldown still advances).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// The user this digest is for
    pub user_id: UserId,
    /// Selected topics, newest first, at most `max_top_topics` entries
    pub topics: Vec<TopicMeta>,
    /// When the digest was generated
    pub generated_at: DateTime<Utc>,
}

/// Events emitted by the digest service
///
/// Consumers subscribe via [`crate::DigestService::subscribe`] and receive
/// all events independently through a broadcast channel.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A digest was produced and handed to the mailer
    DigestProduced {
        /// The user the digest is for
        user_id: UserId,
        /// Number of topics included
        topic_count: usize,
        /// When the digest was generated
        generated_at: DateTime<Utc>,
    },

    /// A user's evaluation failed and was skipped for this run
    ///
    /// The user is retried automatically on the next scheduled run since
    /// no partial state was committed.
    UserSkipped {
        /// The skipped user
        user_id: UserId,
        /// Why the evaluation failed
        reason: String,
    },

    /// A full batch run finished
    BatchCompleted {
        /// Number of users evaluated
        evaluated: usize,
        /// Number of digests produced
        produced: usize,
    },
}
