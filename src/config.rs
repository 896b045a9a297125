//! Configuration types for activity-digest

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Digest decision tuning (throttle divisor, cap, batch cadence)
///
/// Groups the knobs that shape what a digest contains and how often the
/// batch job runs. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Divisor for the minimum-topic-age throttle (default: 4)
    ///
    /// A topic must be at least `interval / min_topic_age_divisor` old
    /// before it may appear in a digest, so freshly created topics get a
    /// window in which other readers and processes can act first.
    #[serde(default = "default_min_topic_age_divisor")]
    pub min_topic_age_divisor: u32,

    /// Maximum number of topics per digest (default: 10)
    ///
    /// Candidates beyond the cap are dropped, not deferred: the cursor
    /// advances past them and they never appear in a later digest.
    #[serde(default = "default_max_top_topics")]
    pub max_top_topics: usize,

    /// How often the batch scheduler ticks (default: 5 minutes)
    #[serde(default = "default_batch_tick", with = "duration_serde")]
    pub batch_tick: Duration,

    /// Maximum users evaluated concurrently within one batch run (default: 4)
    #[serde(default = "default_max_concurrent_users")]
    pub max_concurrent_users: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            min_topic_age_divisor: default_min_topic_age_divisor(),
            max_top_topics: default_max_top_topics(),
            batch_tick: default_batch_tick(),
            max_concurrent_users: default_max_concurrent_users(),
        }
    }
}

/// Data storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file (default: "./digest.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Webhook mailer configuration
///
/// The scheduler hands finished summaries to a mailer; the shipped
/// [`crate::mailer::WebhookMailer`] POSTs them as JSON to this endpoint.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Webhook URL to POST activity summaries to (None = deliveries are dropped)
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Value for the Authorization header, if the endpoint requires one
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Delivery timeout (default: 30 seconds)
    #[serde(default = "default_mailer_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            auth_header: None,
            timeout: default_mailer_timeout(),
        }
    }
}

/// Main configuration for the digest service
///
/// Fields are organized into logical sub-configs:
/// - [`digest`](DigestConfig) - throttle divisor, topic cap, batch cadence
/// - [`persistence`](PersistenceConfig) - database location
/// - [`mailer`](MailerConfig) - webhook delivery endpoint
///
/// Sub-config fields are flattened for serialization so the JSON/TOML
/// format stays flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Digest decision tuning
    #[serde(flatten)]
    pub digest: DigestConfig,

    /// Data storage and state management
    pub persistence: PersistenceConfig,

    /// Summary delivery settings
    #[serde(flatten)]
    pub mailer: MailerConfig,
}

impl Config {
    /// Validate configuration values that have no sensible fallback
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.digest.min_topic_age_divisor == 0 {
            return Err(crate::error::Error::Config {
                message: "min_topic_age_divisor must be at least 1".into(),
                key: Some("min_topic_age_divisor".into()),
            });
        }
        if self.digest.max_concurrent_users == 0 {
            return Err(crate::error::Error::Config {
                message: "max_concurrent_users must be at least 1".into(),
                key: Some("max_concurrent_users".into()),
            });
        }
        Ok(())
    }
}

fn default_min_topic_age_divisor() -> u32 {
    4
}

fn default_max_top_topics() -> usize {
    10
}

fn default_batch_tick() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_concurrent_users() -> usize {
    4
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./digest.db")
}

fn default_mailer_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
