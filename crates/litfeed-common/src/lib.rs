//! litfeed-common — Shared types, errors, and cancellation used across all litfeed crates.

pub mod cancel;
pub mod entities;
pub mod error;

// Re-export commonly used types
pub use cancel::CancelFlag;
pub use entities::{
    Article, Length, Platform, ReportRecord, SearchHistoryEntry, VariantKey, VariantSet,
};
pub use error::{LitfeedError, Result};
