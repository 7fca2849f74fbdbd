//! Axum router — maps all URL paths to handlers.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    config::{get_config, update_config},
    history::{delete_history, list_history},
    preview::preview_article,
    reports::{export_reports, generate_report, list_reports, view_report},
    search::do_search,
    stats::{get_stats, list_articles},
};
use crate::sse::sse_handler;
use crate::state::SharedState;

/// Build and return the full Axum router.
pub fn build_router(shared: SharedState) -> Router {
    Router::new()
        // Pipeline
        .route("/api/search", post(do_search))
        .route("/api/preview/{pmid}", get(preview_article))

        // Reports
        .route("/api/reports", post(generate_report).get(list_reports))
        .route("/api/reports/export", post(export_reports))
        .route("/api/reports/{id}", get(view_report))

        // History
        .route("/api/history", get(list_history))
        .route("/api/history/{id}", delete(delete_history))

        // Config + stats
        .route("/api/config", get(get_config).put(update_config))
        .route("/api/stats", get(get_stats))
        .route("/api/articles", get(list_articles))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
