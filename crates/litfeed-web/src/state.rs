//! Shared application state for the web server.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use litfeed_config::{AppConfig, ConfigManager};
use litfeed_db::Store;
use litfeed_ingestion::FeedEvent;

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub store: Store,
    /// Live configuration; hot-swapped by the config handler and re-read by
    /// the scheduler each cycle.
    pub config: RwLock<AppConfig>,
    pub config_manager: ConfigManager,
    /// Broadcast channel for SSE pipeline-progress events.
    pub event_tx: broadcast::Sender<FeedEvent>,
}

impl AppState {
    pub fn new(store: Store, config: AppConfig, config_manager: ConfigManager) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store,
            config: RwLock::new(config),
            config_manager,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.event_tx.subscribe()
    }
}

pub type SharedState = Arc<AppState>;
