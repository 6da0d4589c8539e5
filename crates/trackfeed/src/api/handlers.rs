//! Request handlers.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use super::AppState;
use crate::ticker::TickerOutcome;
use crate::track::{AddOutcome, NewTrack, TrackField, TrackId, TrackRecord};
use crate::webhook::{WebhookId, WebhookSubscription};

type ApiResult<T> = Result<T, ApiError>;

/// Service information.
#[derive(Debug, Serialize)]
pub(crate) struct ApiInfo {
    uptime: String,
    info: &'static str,
    version: &'static str,
}

/// Request body for `POST /track/`.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitTrack {
    url: String,
}

/// Response body for `POST /track/`.
#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    id: TrackId,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    duplicate: bool,
}

/// Public JSON view of a track.
#[derive(Debug, Serialize)]
pub(crate) struct TrackResponse {
    #[serde(rename = "H_date", skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    pilot: String,
    glider: String,
    glider_id: String,
    track_length: f64,
    track_src_url: String,
}

impl From<TrackRecord> for TrackResponse {
    fn from(track: TrackRecord) -> Self {
        Self {
            date: track.date.map(|d| d.to_string()),
            pilot: track.pilot,
            glider: track.glider,
            glider_id: track.glider_id,
            track_length: track.distance,
            track_src_url: track.source_url,
        }
    }
}

/// Request body for `POST /webhook/new_track/`.
#[derive(Debug, Deserialize)]
pub(crate) struct RegisterWebhook {
    #[serde(rename = "webhookURL")]
    url: String,
    #[serde(rename = "minTriggerValue", default)]
    min_trigger_count: Option<i64>,
}

/// Response body carrying a new id.
#[derive(Debug, Serialize)]
pub(crate) struct IdResponse {
    id: i64,
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid id: {raw}")))
}

/// Format an uptime as an ISO-8601 duration, counting 30-day months and
/// 12-month years.
pub(crate) fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let seconds = total % 60;
    let minutes = total / 60 % 60;
    let total_hours = total / 3600;
    let hours = total_hours % 24;
    let days = total_hours / 24 % 30;
    let months = total_hours / (24 * 30) % 12;
    let years = total_hours / (24 * 30 * 12);
    format!("P{years}Y{months}M{days}DT{hours}H{minutes}M{seconds}S")
}

/// `GET /api/`
pub(crate) async fn api_info(State(state): State<AppState>) -> Json<ApiInfo> {
    Json(ApiInfo {
        uptime: format_uptime(state.started_at.elapsed()),
        info: "Service for IGC tracks",
        version: "v1",
    })
}

/// `GET /track/`
pub(crate) async fn list_tracks(State(state): State<AppState>) -> ApiResult<Json<Vec<TrackId>>> {
    Ok(Json(state.tracks.ids()?))
}

/// `POST /track/`
pub(crate) async fn submit_track(
    State(state): State<AppState>,
    payload: Result<Json<SubmitTrack>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = payload?;
    let url = request.url.trim();
    if url.is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".to_string()));
    }

    let source_key = NewTrack::compute_source_key(url);
    if let Some(id) = state.tracks.find_by_source_key(&source_key)? {
        info!("Track {} was already submitted as {}", url, id);
        return Ok(Json(SubmitResponse {
            id,
            duplicate: true,
        }));
    }

    // A concurrent submission of the same URL can still win the race; `add`
    // reports that as a duplicate.
    let parsed = state.source.fetch(url).await?;
    let outcome = state.tracks.add(&NewTrack::new(url, parsed))?;
    if let AddOutcome::Duplicate(id) = outcome {
        info!("Track {} was already submitted as {}", url, id);
    }

    Ok(Json(SubmitResponse {
        id: outcome.id(),
        duplicate: !outcome.is_inserted(),
    }))
}

/// `GET /track/{id}`
pub(crate) async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackResponse>> {
    let id = parse_id(&id)?;
    let track = state
        .tracks
        .get(id)?
        .ok_or_else(|| ApiError::NotFound(format!("track {id} not found")))?;
    Ok(Json(track.into()))
}

/// `GET /track/{id}/{field}`
pub(crate) async fn get_track_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(String, String)>,
) -> ApiResult<String> {
    let id = parse_id(&id)?;
    let track = state
        .tracks
        .get(id)?
        .ok_or_else(|| ApiError::NotFound(format!("track {id} not found")))?;
    let field: TrackField = field.parse()?;
    track
        .field(field)
        .ok_or_else(|| ApiError::NotFound(format!("track {id} has no {field}")))
}

fn ticker_response(state: &AppState, cursor: Option<i64>) -> ApiResult<Response> {
    let tracks = state.tracks.get_all()?;
    Ok(match state.pager.page(&tracks, cursor)? {
        TickerOutcome::Page(page) => Json(page).into_response(),
        TickerOutcome::NoNewTracks => Json(json!({ "message": "no new tracks" })).into_response(),
    })
}

/// `GET /ticker/`
pub(crate) async fn ticker(State(state): State<AppState>) -> ApiResult<Response> {
    ticker_response(&state, None)
}

/// `GET /ticker/{cursor}`
pub(crate) async fn ticker_after(
    State(state): State<AppState>,
    Path(cursor): Path<String>,
) -> ApiResult<Response> {
    let cursor = cursor
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid cursor: {cursor}")))?;
    ticker_response(&state, Some(cursor))
}

/// `GET /ticker/latest/`
pub(crate) async fn ticker_latest(State(state): State<AppState>) -> ApiResult<String> {
    state
        .tracks
        .latest_timestamp()?
        .map(|t| t.to_string())
        .ok_or_else(|| ApiError::NotFound("no tracks have been added".to_string()))
}

/// `POST /webhook/new_track/`
pub(crate) async fn register_webhook(
    State(state): State<AppState>,
    payload: Result<Json<RegisterWebhook>, JsonRejection>,
) -> ApiResult<Json<IdResponse>> {
    let Json(request) = payload?;
    let id = state
        .webhooks
        .register(&request.url, request.min_trigger_count)?;
    Ok(Json(IdResponse { id }))
}

fn webhook_not_found(id: WebhookId) -> ApiError {
    ApiError::NotFound(format!("webhook {id} not found"))
}

/// `GET /webhook/new_track/{id}`
pub(crate) async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WebhookSubscription>> {
    let id = parse_id(&id)?;
    state
        .webhooks
        .get(id)?
        .map(Json)
        .ok_or_else(|| webhook_not_found(id))
}

/// `DELETE /webhook/new_track/{id}`
pub(crate) async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WebhookSubscription>> {
    let id = parse_id(&id)?;
    state
        .webhooks
        .delete(id)?
        .map(Json)
        .ok_or_else(|| webhook_not_found(id))
}

/// `GET /admin/api/tracks_count`
pub(crate) async fn admin_tracks_count(State(state): State<AppState>) -> ApiResult<String> {
    Ok(state.tracks.count()?.to_string())
}

/// `DELETE /admin/api/tracks`
pub(crate) async fn admin_delete_tracks(State(state): State<AppState>) -> ApiResult<String> {
    let removed = state.tracks.delete_all()?;
    info!("Deleted {} tracks", removed);
    Ok(removed.to_string())
}
