//! litfeed-ingestion — Literature search and the feed pipeline.
//!
//! - PubMed E-utilities client (identifier search + batch metadata fetch)
//! - Pipeline orchestration: query generation → search → dedup → content →
//!   report, with progress events and stage-boundary cancellation

pub mod pipeline;
pub mod sources;

pub use pipeline::{run_feed, run_search, FeedEvent, SearchJob, SearchOutcome};
pub use sources::{LiteratureSource, SourceError};
