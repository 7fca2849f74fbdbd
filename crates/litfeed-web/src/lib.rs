//! litfeed-web — JSON API over the feed pipeline, plus the cron scheduler.

pub mod handlers;
pub mod router;
pub mod scheduler;
pub mod sse;
pub mod state;
