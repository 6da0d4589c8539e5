//! HTTP API.
//!
//! Endpoints (each collection path also answers with a trailing slash):
//! - `GET /api/` - service info and uptime
//! - `GET /track/` - ids of all stored tracks
//! - `POST /track/` - submit a track URL
//! - `GET /track/{id}` and `GET /track/{id}/{field}` - track lookup
//! - `GET /ticker/`, `GET /ticker/{cursor}`, `GET /ticker/latest/` - the feed
//! - `POST /webhook/new_track/`, `GET|DELETE /webhook/new_track/{id}`
//! - `GET /admin/api/tracks_count`, `DELETE /admin/api/tracks`

mod error;
mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::db::{Database, TrackStore, WebhookRegistry};
use crate::source::TrackSource;
use crate::ticker::TickerPager;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    tracks: TrackStore,
    webhooks: WebhookRegistry,
    source: Arc<dyn TrackSource>,
    pager: TickerPager,
    started_at: Instant,
}

impl AppState {
    /// Build the state for a server over `db`.
    #[must_use]
    pub fn new(db: &Database, source: Arc<dyn TrackSource>, page_size: usize) -> Self {
        Self {
            tracks: db.tracks(),
            webhooks: db.webhooks(),
            source,
            pager: TickerPager::new(page_size),
            started_at: Instant::now(),
        }
    }
}

/// Create the HTTP router.
pub fn create_router(state: AppState) -> Router {
    let track_collection = get(handlers::list_tracks).post(handlers::submit_track);
    let webhook_collection = axum::routing::post(handlers::register_webhook);

    Router::new()
        .route("/api", get(handlers::api_info))
        .route("/api/", get(handlers::api_info))
        // Tracks
        .route("/track", track_collection.clone())
        .route("/track/", track_collection)
        .route("/track/{id}", get(handlers::get_track))
        .route("/track/{id}/{field}", get(handlers::get_track_field))
        // Ticker
        .route("/ticker", get(handlers::ticker))
        .route("/ticker/", get(handlers::ticker))
        .route("/ticker/latest", get(handlers::ticker_latest))
        .route("/ticker/latest/", get(handlers::ticker_latest))
        .route("/ticker/{cursor}", get(handlers::ticker_after))
        // Webhooks
        .route("/webhook/new_track", webhook_collection.clone())
        .route("/webhook/new_track/", webhook_collection)
        .route(
            "/webhook/new_track/{id}",
            get(handlers::get_webhook).delete(handlers::delete_webhook),
        )
        // Admin
        .route("/admin/api/tracks_count", get(handlers::admin_tracks_count))
        .route("/admin/api/tracks", delete(handlers::admin_delete_tracks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
