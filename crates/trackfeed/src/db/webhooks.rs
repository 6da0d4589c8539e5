//! The webhook registry.

use tracing::info;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::webhook::{normalize_min_trigger, WebhookId, WebhookSubscription};

/// Durable collection of webhook subscriptions.
#[derive(Debug, Clone)]
pub struct WebhookRegistry {
    db: Database,
}

impl WebhookRegistry {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a webhook and return its id.
    ///
    /// A missing, zero or negative `min_trigger_count` is stored as 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty URL, or a storage error if
    /// the persistence call fails.
    pub fn register(&self, url: &str, min_trigger_count: Option<i64>) -> Result<WebhookId> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::validation("webhookURL must not be empty"));
        }

        self.db.with(|inner| {
            let webhook = WebhookSubscription {
                id: inner.webhook_ids.next(),
                url: url.to_string(),
                min_trigger_count: normalize_min_trigger(min_trigger_count),
            };
            inner.storage.insert_webhook(&webhook)?;
            inner.webhook_ids.commit(webhook.id);

            info!(
                "Registered webhook {} for {} (min trigger {})",
                webhook.id, webhook.url, webhook.min_trigger_count
            );
            Ok(webhook.id)
        })
    }

    /// Get a webhook by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn get(&self, id: WebhookId) -> Result<Option<WebhookSubscription>> {
        self.db.with(|inner| inner.storage.get_webhook(id))
    }

    /// Remove a webhook, returning the removed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn delete(&self, id: WebhookId) -> Result<Option<WebhookSubscription>> {
        self.db.with(|inner| {
            let removed = inner.storage.delete_webhook(id)?;
            if removed.is_some() {
                info!("Deleted webhook {}", id);
            }
            Ok(removed)
        })
    }

    /// All webhooks in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn list(&self) -> Result<Vec<WebhookSubscription>> {
        self.db.with(|inner| inner.storage.all_webhooks())
    }

    /// The highest id ever assigned, or 0 if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence call fails.
    pub fn last_id(&self) -> Result<WebhookId> {
        self.db.with(|inner| {
            let persisted = inner.storage.last_webhook_id()?;
            Ok(persisted.max(inner.webhook_ids.last()))
        })
    }
}
