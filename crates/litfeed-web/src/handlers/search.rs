//! Search endpoint: interest or raw query in, new articles out.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use litfeed_common::CancelFlag;
use litfeed_ingestion::pipeline::{run_search, SearchJob};
use litfeed_ingestion::sources::pubmed::PubMedClient;
use litfeed_llm::{OpenAiCompatibleBackend, QueryGenerator};

use super::ApiError;
use crate::state::SharedState;

/// Input priority: `natural_language` (LLM generates the query), then
/// `custom_query` (used verbatim), then `interest_index` into the configured
/// interest list.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub natural_language: Option<String>,
    pub custom_query: Option<String>,
    pub interest_index: Option<usize>,
    pub days: Option<u32>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ArticlePreview {
    pub pmid: String,
    pub title: String,
    pub journal: String,
    pub pub_date: String,
    pub score: Option<f64>,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub status: &'static str,
    pub query: String,
    pub total_found: usize,
    pub new_articles: usize,
    pub history_id: Option<i64>,
    pub articles: Vec<ArticlePreview>,
    pub errors: Vec<String>,
}

/// POST /api/search
pub async fn do_search(
    State(state): State<SharedState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let config = state.config.read().await.clone();

    fn trimmed(s: &Option<String>) -> Option<&str> {
        s.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    let (interests, raw_query) = if let Some(nl) = trimmed(&req.natural_language) {
        (vec![nl.to_string()], None)
    } else if let Some(raw) = trimmed(&req.custom_query) {
        (vec![], Some(raw.to_string()))
    } else {
        let index = req.interest_index.unwrap_or(0);
        let interest = config
            .interests
            .get(index)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid interest index {index}")))?;
        (vec![interest.clone()], None)
    };

    let job = SearchJob {
        interests,
        raw_query,
        since_days: req.days.unwrap_or_else(|| config.pubmed.clamped_days()),
        max_results: req.max_results.unwrap_or_else(|| config.pubmed.clamped_max_results()),
    };

    let backend = Arc::new(OpenAiCompatibleBackend::from_config(&config.llm));
    let querygen = QueryGenerator::new(backend);
    let client = PubMedClient::from_config(&config.pubmed);

    let outcome = run_search(
        &job,
        &state.store,
        &querygen,
        &client,
        &CancelFlag::new(),
        Some(&state.event_tx),
    )
    .await?;

    let articles = outcome
        .new_articles
        .iter()
        .take(20)
        .map(|a| ArticlePreview {
            pmid: a.pmid.clone(),
            title: a.title.clone(),
            journal: a.journal.clone(),
            pub_date: a.pub_date.clone(),
            score: a.quality_score,
            url: a.url(),
        })
        .collect();

    Ok(Json(SearchResponse {
        status: "success",
        query: outcome.query,
        total_found: outcome.total_found,
        new_articles: outcome.new_articles.len(),
        history_id: outcome.history_id,
        articles,
        errors: outcome.errors,
    }))
}
