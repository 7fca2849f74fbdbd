//! litfeed-db — Local SQLite store for articles, reports, and search history.
//!
//! The store is the single source of truth for "has this identifier ever been
//! seen". Articles are keyed by PMID, inserted once and never mutated except
//! for the quality score.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{Store, StoreStats};
