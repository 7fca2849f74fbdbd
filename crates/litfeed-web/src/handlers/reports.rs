//! Report generation, listing, viewing, and export.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use litfeed_common::{Article, CancelFlag, ReportRecord};
use litfeed_ingestion::pipeline::generate_contents;
use litfeed_ingestion::sources::pubmed::PubMedClient;
use litfeed_ingestion::LiteratureSource;
use litfeed_llm::{ContentGenerator, OpenAiCompatibleBackend};
use litfeed_report::{export_zip, read_report, ReportAssembler, SlotSelection};

use super::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub pmids: Vec<String>,
    /// Optional article-index override per template slot (6 entries).
    pub slots: Option<Vec<usize>>,
    /// Bundle date key; defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub report: ReportRecord,
}

/// POST /api/reports
pub async fn generate_report(
    State(state): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    if req.pmids.is_empty() {
        return Err(ApiError::BadRequest("no pmids supplied".to_string()));
    }
    let config = state.config.read().await.clone();

    // Resolve articles: the store first, the remote service for the rest.
    // This path serves explicit identifier selections, so it does not apply
    // dedup filtering.
    let mut articles: Vec<Article> = Vec::with_capacity(req.pmids.len());
    let mut missing: Vec<String> = Vec::new();
    for pmid in &req.pmids {
        match state.store.get_article(pmid).await? {
            Some(article) => articles.push(article),
            None => missing.push(pmid.clone()),
        }
    }
    if !missing.is_empty() {
        let client = PubMedClient::from_config(&config.pubmed);
        let fetched = client.fetch_articles(&missing).await?;
        state.store.upsert_articles(&fetched).await?;
        articles.extend(fetched);
    }
    if articles.is_empty() {
        return Err(ApiError::NotFound("no articles found for the given pmids".to_string()));
    }
    // Keep the caller ordering; slot indices refer to it
    articles.sort_by_key(|a| req.pmids.iter().position(|p| p == &a.pmid).unwrap_or(usize::MAX));

    let backend = Arc::new(OpenAiCompatibleBackend::from_config(&config.llm));
    let generator = ContentGenerator::new(backend);
    let contents = generate_contents(&generator, &articles, Some(&state.event_tx)).await;

    let selection = match req.slots {
        Some(slots) if slots.len() == 6 => {
            let mut idx = [0usize; 6];
            idx.copy_from_slice(&slots);
            SlotSelection(idx)
        }
        Some(_) => return Err(ApiError::BadRequest("slots must have 6 entries".to_string())),
        None => SlotSelection::default(),
    };

    let assembler = ReportAssembler::new(&config.storage.reports_dir);
    let report = assembler
        .create_report(
            req.date.unwrap_or_else(|| Utc::now().date_naive()),
            &articles,
            &contents,
            &selection,
            &state.store,
            &CancelFlag::new(),
        )
        .await?;

    Ok(Json(GenerateResponse { status: "success", report }))
}

/// GET /api/reports
pub async fn list_reports(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ReportRecord>>, ApiError> {
    Ok(Json(state.store.get_reports(50).await?))
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    /// Optional generated file name to read inline.
    pub file: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub report: ReportRecord,
    pub file: Option<String>,
    pub content: Option<String>,
}

/// GET /api/reports/{id}
pub async fn view_report(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<ViewParams>,
) -> Result<Json<ViewResponse>, ApiError> {
    let report = state
        .store
        .get_report(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("report {id} not found")))?;

    let content = match &params.file {
        Some(name) => {
            let path = report
                .file_paths
                .get(name)
                .ok_or_else(|| ApiError::NotFound(format!("file {name} not in report")))?;
            Some(read_report(path)?)
        }
        None => None,
    };

    Ok(Json(ViewResponse { report, file: params.file, content }))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub report_ids: Vec<String>,
}

/// POST /api/reports/export returns a zip archive of the selected reports.
pub async fn export_reports(
    State(state): State<SharedState>,
    Json(req): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let mut reports = Vec::with_capacity(req.report_ids.len());
    for id in &req.report_ids {
        if let Some(report) = state.store.get_report(id).await? {
            reports.push(report);
        }
    }
    if reports.is_empty() {
        return Err(ApiError::NotFound("no matching reports".to_string()));
    }

    let bytes = export_zip(&reports)?;
    let filename = format!(
        "reports_export_{}.zip",
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
        .into_response())
}
