//! Shared API error type for HTTP handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::state::ErrorResponse;

/// Application error type surfaced by handlers.
#[derive(Debug)]
pub struct AppError(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: self.0 }),
        )
            .into_response()
    }
}

impl From<tabq::TabqError> for AppError {
    fn from(e: tabq::TabqError) -> Self {
        AppError(e.to_string())
    }
}
