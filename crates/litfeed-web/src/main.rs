//! litfeed web server.
//!
//! Run with: cargo run -p litfeed-web

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use litfeed_common::CancelFlag;
use litfeed_config::ConfigManager;
use litfeed_db::Store;
use litfeed_web::{router::build_router, scheduler::run_scheduler, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_manager = ConfigManager::from_env();
    let config = config_manager.load()?;
    info!(config_path = %config_manager.path().display(), "Configuration loaded");

    let store = Store::open(&config.storage.db_path).await?;
    let bind = config.web.bind.clone();

    let shared = Arc::new(AppState::new(store, config, config_manager));

    // Scheduler runs alongside the server and stops on shutdown
    let cancel = CancelFlag::new();
    let scheduler_handle = tokio::spawn(run_scheduler(shared.clone(), cancel.clone()));

    let app = build_router(shared);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Server listening on http://{bind}");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown_cancel.cancel();
        })
        .await?;

    cancel.cancel();
    scheduler_handle.abort();

    Ok(())
}
