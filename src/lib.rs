//! # activity-digest
//!
//! Backend library for periodic activity-summary emails ("digests") in a
//! multi-tenant discussion platform.
//!
//! ## Design Philosophy
//!
//! activity-digest is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Pluggable at the seams** - Clock, authorization, and mail delivery
//!   are trait objects the embedder can replace
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use activity_digest::{Config, DigestInterval, DigestService, PreferenceOverride, UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let service = DigestService::new(config).await?;
//!
//!     // Register a user and opt them into daily digests
//!     let user = UserId(42);
//!     service.create_user(user).await?;
//!     service
//!         .set_user_prefs(
//!             user,
//!             PreferenceOverride {
//!                 interval: Some(DigestInterval::DAILY),
//!                 send_even_if_active: None,
//!             },
//!         )
//!         .await?;
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Run the batch scheduler until shutdown
//!     service.spawn_scheduler();
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Authorization seam for topic visibility
pub mod authz;
/// Injectable time source
pub mod clock;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// The per-user eligibility gate
pub mod eligibility;
/// Error types
pub mod error;
/// Summary delivery
pub mod mailer;
/// Layered preference resolution
pub mod prefs;
/// Batch digest orchestration
pub mod scheduler;
/// Periodic batch-run loop
pub mod scheduler_task;
/// Top-level service facade
pub mod service;
/// Candidate topic gathering and selection
pub mod topics;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use authz::{AllowAllAuthorizer, Authorization, CategoryAuthorizer};
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::{Config, DigestConfig, MailerConfig, PersistenceConfig};
pub use db::Database;
pub use error::{DatabaseError, Error, Result};
pub use mailer::{Mailer, NoOpMailer, RecordingMailer, WebhookMailer};
pub use scheduler::DigestScheduler;
pub use service::DigestService;
pub use types::{
    ActivitySummary, CategoryId, DigestInterval, EffectivePrefs, Event, GroupId, PageId,
    PreferenceOverride, TopicMeta, UserId, UserStats,
};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use activity_digest::{Config, DigestService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = DigestService::new(config).await?;
///     service.spawn_scheduler();
///
///     // Run with automatic signal handling
///     run_with_shutdown(service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: DigestService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
