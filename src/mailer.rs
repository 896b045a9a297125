//! Summary delivery.
//!
//! The mail transport is outside this library's responsibility: the
//! scheduler hands a finished [`ActivitySummary`] to a [`Mailer`] and
//! moves on (fire and forget). Delivery failures are logged, never
//! propagated back into the scheduling decision.

use crate::config::MailerConfig;
use crate::error::{Error, Result};
use crate::types::{ActivitySummary, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

/// Accepts activity summaries for delivery (trait object for pluggable
/// transports)
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one summary
    async fn deliver(&self, summary: &ActivitySummary) -> Result<()>;

    /// Name of this implementation, for logging
    fn name(&self) -> &'static str;
}

/// Mailer that drops every summary
///
/// The default when no delivery endpoint is configured.
pub struct NoOpMailer;

#[async_trait]
impl Mailer for NoOpMailer {
    async fn deliver(&self, summary: &ActivitySummary) -> Result<()> {
        tracing::debug!(
            user_id = %summary.user_id,
            topic_count = summary.topics.len(),
            "No mailer configured, dropping summary"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// JSON payload POSTed by [`WebhookMailer`]
#[derive(Debug, Serialize)]
pub struct SummaryPayload<'a> {
    /// Constant event discriminator ("activity_summary")
    pub event: &'static str,
    /// The user the digest is for
    pub user_id: UserId,
    /// The summary itself
    pub summary: &'a ActivitySummary,
    /// Unix timestamp of the delivery attempt
    pub timestamp: i64,
}

/// Mailer that POSTs summaries as JSON to a configured HTTP endpoint
///
/// Intended for handing digests to an external rendering/delivery
/// service. Requests carry an optional Authorization header and a
/// delivery timeout from [`MailerConfig`].
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    auth_header: Option<String>,
    timeout: std::time::Duration,
}

impl WebhookMailer {
    /// Build a webhook mailer from config
    ///
    /// Returns None when no webhook URL is configured.
    pub fn from_config(config: &MailerConfig) -> Option<Self> {
        let url = config.webhook_url.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            url,
            auth_header: config.auth_header.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn deliver(&self, summary: &ActivitySummary) -> Result<()> {
        let payload = SummaryPayload {
            event: "activity_summary",
            user_id: summary.user_id,
            summary,
            timestamp: chrono::Utc::now().timestamp(),
        };

        let mut request = self
            .client
            .post(&self.url)
            .json(&payload)
            .timeout(self.timeout);
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Mailer(format!(
                "webhook returned status {} for user {}",
                response.status(),
                summary.user_id
            )));
        }

        tracing::debug!(
            user_id = %summary.user_id,
            topic_count = summary.topics.len(),
            url = %self.url,
            "Delivered summary to webhook"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Mailer that records every delivery in memory
///
/// For tests and simulations that assert digest presence/absence.
#[derive(Default)]
pub struct RecordingMailer {
    delivered: Mutex<Vec<ActivitySummary>>,
}

impl RecordingMailer {
    /// Create an empty recording mailer
    pub fn new() -> Self {
        Self::default()
    }

    /// All summaries delivered so far, in delivery order
    pub async fn delivered(&self) -> Vec<ActivitySummary> {
        self.delivered.lock().await.clone()
    }

    /// Summaries delivered for one user
    pub async fn delivered_for(&self, user_id: UserId) -> Vec<ActivitySummary> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Instants at which digests were generated for one user
    pub async fn generation_times_for(&self, user_id: UserId) -> Vec<DateTime<Utc>> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.generated_at)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn deliver(&self, summary: &ActivitySummary) -> Result<()> {
        self.delivered.lock().await.push(summary.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
