//! End-to-end feed pipeline.
//!
//! Orchestrates the full flow for one run:
//!   1. Translate interests into a combined PubMed query (or take a raw query)
//!   2. Search for identifiers within the date window
//!   3. Filter against the dedup store — only genuinely new identifiers go on
//!   4. Fetch metadata, score, and persist the new articles
//!   5. Record the search in history
//!   6. (run_feed) generate the four content variants per new article and
//!      assemble a dated report
//!
//! Recoverable failures degrade per item and are accumulated in
//! `SearchOutcome::errors`; a remote-service failure after retries is
//! recorded as a zero-new-article search rather than a crash. The run is
//! cancellable at stage boundaries; completed upserts stay durable.

use std::collections::HashMap;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use litfeed_common::{Article, CancelFlag, LitfeedError, ReportRecord, VariantSet};
use litfeed_db::Store;
use litfeed_llm::{ContentGenerator, QueryGenerator};
use litfeed_report::{ReportAssembler, SlotSelection};

use crate::sources::LiteratureSource;

/// How many articles generate content concurrently. The four variant calls
/// of one article already run in parallel; this bounds the article fan-out.
const CONTENT_CONCURRENCY: usize = 4;

// ── Job / outcome ─────────────────────────────────────────────────────────────

/// Parameters for a single pipeline run.
#[derive(Debug, Clone)]
pub struct SearchJob {
    /// Natural-language interests; translated to queries unless `raw_query`
    /// is supplied.
    pub interests: Vec<String>,
    /// A formal query given directly, bypassing generation.
    pub raw_query: Option<String>,
    pub since_days: u32,
    pub max_results: usize,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// The formal query actually used ("" means no search was performed).
    pub query: String,
    pub total_found: usize,
    /// Genuinely new articles, highest score first.
    pub new_articles: Vec<Article>,
    pub history_id: Option<i64>,
    /// Degraded portions of the run, one message each.
    pub errors: Vec<String>,
}

impl SearchOutcome {
    fn empty(query: String) -> Self {
        Self { query, total_found: 0, new_articles: Vec::new(), history_id: None, errors: Vec::new() }
    }
}

/// Progress event emitted during a run (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct FeedEvent {
    pub stage: String,
    pub message: String,
}

fn emit(progress: Option<&broadcast::Sender<FeedEvent>>, stage: &str, message: String) {
    if let Some(tx) = progress {
        let _ = tx.send(FeedEvent { stage: stage.to_string(), message });
    }
}

fn check_cancel(cancel: &CancelFlag, stage: &str) -> litfeed_common::Result<()> {
    if cancel.is_cancelled() {
        warn!(stage, "Pipeline cancelled");
        return Err(LitfeedError::Cancelled(stage.to_string()));
    }
    Ok(())
}

// ── Scoring ───────────────────────────────────────────────────────────────────

const BASE_SCORE: f64 = 50.0;
const RECENCY_BONUS: f64 = 20.0;

/// Relevance heuristic for newly fetched articles. Every candidate already
/// sits inside the trailing search window, so the recency bonus is flat.
fn score_article(_article: &Article) -> f64 {
    BASE_SCORE + RECENCY_BONUS
}

// ── Search stage ──────────────────────────────────────────────────────────────

/// Run query generation → search → dedup filter → fetch → upsert → history.
///
/// Returns a `SearchOutcome` even when the remote service fails after
/// retries: the failure is recorded as a zero-new-article search with the
/// reason in `errors`.
#[instrument(skip_all, fields(days = job.since_days, max = job.max_results))]
pub async fn run_search(
    job: &SearchJob,
    store: &Store,
    querygen: &QueryGenerator,
    source: &dyn LiteratureSource,
    cancel: &CancelFlag,
    progress: Option<&broadcast::Sender<FeedEvent>>,
) -> litfeed_common::Result<SearchOutcome> {
    // ── 1. Build the formal query ─────────────────────────────────────────────
    emit(progress, "query", "Generating search query".to_string());
    let (query, natural_language) = match &job.raw_query {
        Some(raw) => (raw.trim().to_string(), None),
        None => {
            let queries = querygen.generate_queries(&job.interests).await;
            let combined = QueryGenerator::combine_queries(&queries);
            let original = (!job.interests.is_empty()).then(|| job.interests.join("; "));
            (combined, original)
        }
    };

    if query.is_empty() {
        info!("Empty query, nothing to search");
        return Ok(SearchOutcome::empty(query));
    }
    info!(query = %query, "Starting search");

    check_cancel(cancel, "search")?;
    emit(progress, "search", format!("Searching PubMed: {query}"));

    // ── 2. Identifier search ──────────────────────────────────────────────────
    let ids = match source.search(&query, job.since_days, job.max_results).await {
        Ok(ids) => ids,
        Err(e) => {
            let msg = format!("search failed: {e}");
            warn!("{msg}");
            let history_id = store
                .save_search_history(&query, natural_language.as_deref(), 0, 0)
                .await?;
            let mut outcome = SearchOutcome::empty(query);
            outcome.history_id = Some(history_id);
            outcome.errors.push(msg);
            return Ok(outcome);
        }
    };
    let total_found = ids.len();

    // ── 3. Dedup filter before fetch, upsert, and any content generation ──────
    let new_ids = store.filter_new(&ids).await?;
    info!(total_found, new = new_ids.len(), "Identifiers filtered against store");

    check_cancel(cancel, "fetch")?;
    emit(progress, "fetch", format!("{} found, {} new; fetching metadata", total_found, new_ids.len()));

    // ── 4. Metadata fetch for the new identifiers only ────────────────────────
    let mut errors = Vec::new();
    let mut articles = match source.fetch_articles(&new_ids).await {
        Ok(articles) => articles,
        Err(e) => {
            let msg = format!("fetch failed: {e}");
            warn!("{msg}");
            errors.push(msg);
            Vec::new()
        }
    };

    for article in &mut articles {
        article.quality_score = Some(score_article(article));
    }
    articles.sort_by(|a, b| {
        b.quality_score
            .partial_cmp(&a.quality_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    check_cancel(cancel, "upsert")?;

    // ── 5. Persist new articles and the history entry ─────────────────────────
    let inserted = store.upsert_articles(&articles).await?;
    let history_id = store
        .save_search_history(
            &query,
            natural_language.as_deref(),
            total_found as i64,
            articles.len() as i64,
        )
        .await?;

    info!(
        total_found,
        new = articles.len(),
        inserted,
        history_id,
        "Search complete"
    );
    emit(progress, "search_done", format!("{} new articles", articles.len()));

    Ok(SearchOutcome {
        query,
        total_found,
        new_articles: articles,
        history_id: Some(history_id),
        errors,
    })
}

// ── Content stage ─────────────────────────────────────────────────────────────

/// Generate all four variants for each article, bounded fan-out across
/// articles. Individual variant failures already degrade to fallback copy
/// inside the generator, so this map is always complete.
pub async fn generate_contents(
    generator: &ContentGenerator,
    articles: &[Article],
    progress: Option<&broadcast::Sender<FeedEvent>>,
) -> HashMap<String, VariantSet> {
    emit(progress, "content", format!("Generating content for {} articles", articles.len()));
    let pmids: Vec<String> = articles.iter().map(|a| a.pmid.clone()).collect();
    let mut futures = Vec::with_capacity(articles.len());
    for article in articles {
        futures.push(generator.generate_all(article));
    }
    let sets: Vec<VariantSet> =
        stream::iter(futures).buffered(CONTENT_CONCURRENCY).collect().await;
    pmids.into_iter().zip(sets).collect()
}

// ── Full feed run ─────────────────────────────────────────────────────────────

/// The unattended entry point used by the scheduler and the CLI: search, then
/// content and a dated report for whatever came back new. No new articles
/// means no report, not an error.
#[allow(clippy::too_many_arguments)]
pub async fn run_feed(
    job: &SearchJob,
    store: &Store,
    querygen: &QueryGenerator,
    content: &ContentGenerator,
    source: &dyn LiteratureSource,
    assembler: &ReportAssembler,
    cancel: &CancelFlag,
    progress: Option<&broadcast::Sender<FeedEvent>>,
) -> litfeed_common::Result<(SearchOutcome, Option<ReportRecord>)> {
    let outcome = run_search(job, store, querygen, source, cancel, progress).await?;
    if outcome.new_articles.is_empty() {
        info!("No new articles, skipping report");
        emit(progress, "complete", "No new articles".to_string());
        return Ok((outcome, None));
    }

    check_cancel(cancel, "content")?;
    let contents = generate_contents(content, &outcome.new_articles, progress).await;

    check_cancel(cancel, "report")?;
    emit(progress, "report", "Assembling report".to_string());
    let record = assembler
        .create_report(
            Utc::now().date_naive(),
            &outcome.new_articles,
            &contents,
            &SlotSelection::default(),
            store,
            cancel,
        )
        .await?;

    emit(
        progress,
        "complete",
        format!("Report {} with {} articles", record.id, record.article_count),
    );
    Ok((outcome, Some(record)))
}
