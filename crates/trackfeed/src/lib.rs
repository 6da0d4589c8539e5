//! `trackfeed` - flight track ingestion with a ticker feed and webhooks
//!
//! This library provides the track store with its deduplication and id
//! policy, the cursor-based ticker, the webhook registry and the background
//! change notifier, together with the HTTP API that exposes them.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod igc;
pub mod logging;
pub mod notifier;
pub mod source;
pub mod storage;
pub mod ticker;
pub mod track;
pub mod webhook;

pub use config::Config;
pub use db::{Database, TrackStore, WebhookRegistry};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use notifier::{ChangeNotifier, NotifierState};
pub use storage::{Storage, StorageStats};
pub use ticker::{TickerOutcome, TickerPage, TickerPager};
pub use track::{AddOutcome, NewTrack, TrackField, TrackId, TrackRecord};
pub use webhook::{Notification, WebhookId, WebhookSubscription};
