//! JSON API handlers.

pub mod config;
pub mod history;
pub mod preview;
pub mod reports;
pub mod search;
pub mod stats;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use litfeed_common::LitfeedError;

/// Error type returned by every handler; renders as a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(LitfeedError),
}

impl From<LitfeedError> for ApiError {
    fn from(e: LitfeedError) -> Self {
        ApiError::Internal(e)
    }
}

impl From<litfeed_db::StoreError> for ApiError {
    fn from(e: litfeed_db::StoreError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl From<litfeed_ingestion::SourceError> for ApiError {
    fn from(e: litfeed_ingestion::SourceError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Request failed");
                let status = match &e {
                    LitfeedError::RemoteService(_)
                    | LitfeedError::Generation(_)
                    | LitfeedError::Http(_) => StatusCode::BAD_GATEWAY,
                    LitfeedError::Cancelled(_) => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };
        let body = Json(serde_json::json!({
            "status": "error",
            "message": message,
        }));
        (status, body).into_response()
    }
}
