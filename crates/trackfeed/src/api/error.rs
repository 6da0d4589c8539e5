//! Mapping of domain errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::Error;

/// Body of every error response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// An error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    /// 400: the request was malformed or referenced unusable input.
    BadRequest(String),
    /// 404: the requested entity or field does not exist.
    NotFound(String),
    /// 500: the service could not complete the request.
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            error!("Request failed: {}", err);
            Self::Internal(err.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(m) | Self::NotFound(m) => m,
            Self::Internal(_) => "internal server error".to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
