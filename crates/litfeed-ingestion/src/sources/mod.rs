//! Literature source clients.

pub mod pubmed;

use async_trait::async_trait;
use thiserror::Error;

use litfeed_common::Article;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote service error: {0}")]
    RemoteService(String),
    #[error("Malformed response: {0}")]
    Parse(String),
}

impl SourceError {
    /// Network and rate-limit failures are worth retrying; a malformed body
    /// will not improve on a second attempt.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, SourceError::Parse(_))
    }
}

impl From<SourceError> for litfeed_common::LitfeedError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Http(h) => litfeed_common::LitfeedError::Http(h),
            SourceError::RemoteService(m) => litfeed_common::LitfeedError::RemoteService(m),
            SourceError::Parse(m) => litfeed_common::LitfeedError::Parse(m),
        }
    }
}

/// Common interface for literature source clients.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Search for record identifiers matching a query within the trailing
    /// `since_days` window, capped at `max_results`, in the order the remote
    /// service returns them.
    async fn search(
        &self,
        query: &str,
        since_days: u32,
        max_results: usize,
    ) -> Result<Vec<String>, SourceError>;

    /// Fetch full metadata for a batch of identifiers. A single malformed
    /// record is skipped with a warning, never aborting the batch.
    async fn fetch_articles(&self, ids: &[String]) -> Result<Vec<Article>, SourceError>;

    /// Compose search and fetch. This is the only entry point the pipeline calls.
    async fn search_and_fetch(
        &self,
        query: &str,
        since_days: u32,
        max_results: usize,
    ) -> Result<Vec<Article>, SourceError> {
        let ids = self.search(query, since_days, max_results).await?;
        self.fetch_articles(&ids).await
    }
}
