//! Store statistics and article listing endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use litfeed_common::Article;
use litfeed_db::StoreStats;

use super::ApiError;
use crate::state::SharedState;

/// GET /api/stats
pub async fn get_stats(State(state): State<SharedState>) -> Result<Json<StoreStats>, ApiError> {
    Ok(Json(state.store.stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct ArticlesParams {
    pub limit: Option<i64>,
}

/// GET /api/articles, most recently fetched first.
pub async fn list_articles(
    State(state): State<SharedState>,
    Query(params): Query<ArticlesParams>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    Ok(Json(state.store.get_articles(limit).await?))
}
