//! Configuration endpoints — read and hot-swap the live settings.

use axum::extract::State;
use axum::Json;

use litfeed_config::AppConfig;

use super::ApiError;
use crate::state::SharedState;

/// GET /api/config
pub async fn get_config(State(state): State<SharedState>) -> Json<AppConfig> {
    Json(state.config.read().await.clone())
}

/// PUT /api/config persists to disk and swaps the live structure.
/// The scheduler re-reads the schedule on its next cycle.
pub async fn update_config(
    State(state): State<SharedState>,
    Json(new_config): Json<AppConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .config_manager
        .save(&new_config)
        .map_err(litfeed_common::LitfeedError::Other)?;
    *state.config.write().await = new_config;
    tracing::info!("Configuration updated");
    Ok(Json(serde_json::json!({"status": "success"})))
}
