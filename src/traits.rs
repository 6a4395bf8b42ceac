//! Traits for the engine's external collaborators: the alert store, showtime
//! providers and the notification transport

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{AlertKind, Notification, ShowtimeRecord, Subscription};

/// Failures while fetching a venue's schedule. All of them are transient from the
/// engine's point of view: the affected group simply waits for the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("schedule request returned {0}")]
    Status(reqwest::StatusCode),

    #[error("schedule request timed out after {0}s")]
    Timeout(u64),

    #[error("unknown venue code: {0}")]
    UnknownVenue(String),

    #[error("failed to parse schedule: {0}")]
    Parse(String),
}

/// Failures while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("SMTP credentials are not configured")]
    MissingCredentials,

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
}

/// Configuration for a vendor's schedule endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Display name for the vendor
    pub name: String,
    /// Base URL for the vendor's website
    pub base_url: String,
    /// Schedule URL pattern with `{venue}` and `{date}` placeholders
    pub schedule_url_pattern: String,
}

/// Source of parsed showtimes for one venue and date
#[async_trait]
pub trait ShowtimeProvider: Send + Sync {
    /// Get the configuration for this provider
    fn config(&self) -> &ProviderConfig;

    /// Fetch and normalize the schedule of a venue for a date
    ///
    /// # Arguments
    /// * `venue_code` - Vendor-specific branch code, e.g. `1351`
    /// * `date` - Screening date
    async fn get_showtimes(
        &self,
        venue_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<ShowtimeRecord>, FetchError>;

    /// Build the schedule URL for a venue and date
    ///
    /// # Returns
    /// * `String` - The pattern with both placeholders filled in, date as `YYYYMMDD`
    fn build_schedule_url(&self, venue_code: &str, date: NaiveDate) -> String {
        let date = date.format("%Y%m%d").to_string();
        self.config()
            .schedule_url_pattern
            .replace("{venue}", &urlencoding::encode(venue_code))
            .replace("{date}", &date)
    }
}

/// Durable storage of subscriptions
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert a new subscription, returning its id
    async fn create(&self, subscription: &Subscription) -> Result<i64>;

    /// All active, unsent subscriptions of one kind
    async fn list_pending(&self, kind: AlertKind) -> Result<Vec<Subscription>>;

    /// Update of an existing subscription's mutable fields; a deleted row stays deleted
    async fn save(&self, subscription: &Subscription) -> Result<()>;

    /// Marks a pending subscription as sent before dispatch.
    ///
    /// Returns `false` when another run already claimed or sent it, so at most
    /// one process delivers each alert.
    async fn claim(&self, subscription: &Subscription) -> Result<bool>;

    /// Undoes a claim whose delivery failed
    async fn release(&self, subscription: &Subscription) -> Result<()>;
}

/// Outbound delivery of rendered notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to one recipient. `Ok` means the transport accepted it.
    async fn send(&self, recipient: &str, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel
    fn channel_name(&self) -> &str;
}
