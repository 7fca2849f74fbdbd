//! Search-history endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use litfeed_common::SearchHistoryEntry;

use super::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

/// GET /api/history
pub async fn list_history(
    State(state): State<SharedState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SearchHistoryEntry>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.store.get_search_history(limit).await?))
}

/// DELETE /api/history/{id}. Deleting an entry never touches articles.
pub async fn delete_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.store.delete_search_history(id).await? {
        Ok(Json(serde_json::json!({"status": "success"})))
    } else {
        Err(ApiError::NotFound(format!("history entry {id} not found")))
    }
}
