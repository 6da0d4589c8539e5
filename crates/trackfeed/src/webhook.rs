//! Webhook subscriptions and outbound notification delivery.
//!
//! A subscription asks to be told when at least `min_trigger_count` new tracks
//! have arrived. Delivery goes through the [`NotificationTransport`] trait so
//! the notifier can be exercised without a network.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::track::TrackId;

/// Identifier assigned to a webhook at registration.
pub type WebhookId = i64;

/// A registered webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Unique, monotonically assigned id.
    pub id: WebhookId,
    /// Notification target.
    #[serde(rename = "webhookURL")]
    pub url: String,
    /// Number of new tracks required before this webhook is notified.
    #[serde(rename = "minTriggerValue")]
    pub min_trigger_count: u32,
}

/// Normalise a requested trigger count: absent, zero or negative means 1.
#[must_use]
pub fn normalize_min_trigger(requested: Option<i64>) -> u32 {
    match requested {
        Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// The JSON body posted to a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Human-readable summary.
    pub content: String,
    /// Arrival timestamp of the newest track.
    pub t_latest: Option<i64>,
    /// Ids of the tracks that arrived since this webhook was last notified.
    pub tracks: Vec<TrackId>,
    /// Time spent preparing the notification, in milliseconds.
    pub processing: u64,
}

impl Notification {
    /// Build a notification announcing `tracks`.
    #[must_use]
    pub fn new_tracks(tracks: Vec<TrackId>, t_latest: Option<i64>, processing: u64) -> Self {
        let content = match tracks.len() {
            1 => "1 new track has been added".to_string(),
            n => format!("{n} new tracks have been added"),
        };
        Self {
            content,
            t_latest,
            tracks,
            processing,
        }
    }
}

/// Outbound notification transport.
#[async_trait]
pub trait NotificationTransport: Send + Sync + fmt::Debug {
    /// Deliver one notification to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotificationDelivery`] if the target could not be
    /// reached or rejected the request.
    async fn send(&self, url: &str, notification: &Notification) -> Result<()>;
}

/// Delivers notifications as JSON `POST` requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn send(&self, url: &str, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::notification_delivery(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::notification_delivery(
                url,
                format!("unexpected status {status}"),
            ));
        }

        debug!("Delivered notification to {}", url);
        Ok(())
    }
}
