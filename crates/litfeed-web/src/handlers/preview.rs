//! On-demand content preview for one article — nothing is persisted.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use litfeed_common::{Article, VariantSet};
use litfeed_ingestion::sources::pubmed::PubMedClient;
use litfeed_ingestion::LiteratureSource;
use litfeed_llm::{ContentGenerator, OpenAiCompatibleBackend};

use super::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub pmid: String,
    pub title: String,
    pub url: String,
    pub variants: VariantSet,
}

/// GET /api/preview/{pmid}
///
/// Looks the article up in the store first; unseen identifiers are fetched
/// from the remote service directly. This path intentionally bypasses dedup
/// filtering: previewing an old article is a legitimate request.
pub async fn preview_article(
    State(state): State<SharedState>,
    Path(pmid): Path<String>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let config = state.config.read().await.clone();

    let article: Article = match state.store.get_article(&pmid).await? {
        Some(article) => article,
        None => {
            let client = PubMedClient::from_config(&config.pubmed);
            client
                .fetch_articles(std::slice::from_ref(&pmid))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::NotFound(format!("article {pmid} not found")))?
        }
    };

    let backend = Arc::new(OpenAiCompatibleBackend::from_config(&config.llm));
    let generator = ContentGenerator::new(backend);
    let variants = generator.generate_all(&article).await;

    Ok(Json(PreviewResponse {
        pmid: article.pmid.clone(),
        title: article.title.clone(),
        url: article.url(),
        variants,
    }))
}
