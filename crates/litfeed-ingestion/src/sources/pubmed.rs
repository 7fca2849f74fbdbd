//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi
//!
//! NCBI enforces a request-rate ceiling (3/s without an API key, 10/s with
//! one); calls are spaced by an async last-call mutex, and transient
//! failures retry with bounded doubling backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use litfeed_common::Article;
use litfeed_config::PubMedConfig;

use super::{LiteratureSource, SourceError};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL:  &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

const FETCH_BATCH_SIZE: usize = 100;
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

pub struct PubMedClient {
    client: reqwest::Client,
    api_key: Option<String>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl PubMedClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::from_config(&PubMedConfig { api_key, ..Default::default() })
    }

    pub fn from_config(cfg: &PubMedConfig) -> Self {
        if cfg.danger_disable_tls_verify {
            warn!("TLS certificate verification disabled for PubMed client");
        }
        let user_agent = match &cfg.email {
            Some(email) => format!("litfeed/0.1 ({email})"),
            None => "litfeed/0.1".to_string(),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .danger_accept_invalid_certs(cfg.danger_disable_tls_verify)
            .build()
            .unwrap_or_default();
        // 3 req/s without an API key, 10 req/s with one
        let min_interval = if cfg.api_key.is_some() {
            Duration::from_millis(110)
        } else {
            Duration::from_millis(340)
        };
        Self {
            client,
            api_key: cfg.api_key.clone(),
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait out the minimum inter-call spacing. The lock is held across the
    /// sleep so concurrent callers serialize instead of bursting.
    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_checked(&self, url: &str, params: &[(&str, String)]) -> Result<reqwest::Response, SourceError> {
        self.pace().await;
        let resp = self.client.get(url).query(params).send().await?;
        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(SourceError::RemoteService("rate limit exceeded".to_string()));
        }
        if status.is_server_error() {
            return Err(SourceError::RemoteService(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::RemoteService(format!("HTTP {status}")));
        }
        Ok(resp)
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Search PubMed and return PMIDs, constrained to the trailing date window.
    #[instrument(skip(self))]
    async fn esearch(&self, query: &str, since_days: u32, max: usize) -> Result<Vec<String>, SourceError> {
        let full_query = with_date_window(query, since_days);
        let mut params = self.base_params();
        params.push(("term", full_query));
        params.push(("retmax", max.to_string()));
        params.push(("sort", "date".to_string()));
        params.push(("retmode", "json".to_string()));

        let resp = self
            .retrying(|| self.get_checked(ESEARCH_URL, &params))
            .await?;
        let json: serde_json::Value = resp.json().await?;

        let ids: Vec<String> = json["esearchresult"]["idlist"]
            .as_array()
            .unwrap_or(&vec![])
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();

        debug!(count = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch PubMed XML for a batch of PMIDs and parse into Articles.
    #[instrument(skip(self, pmids), fields(n = pmids.len()))]
    async fn efetch_batch(&self, pmids: &[String]) -> Result<Vec<Article>, SourceError> {
        let mut params = self.base_params();
        params.push(("id", pmids.join(",")));
        params.push(("rettype", "abstract".to_string()));
        params.push(("retmode", "xml".to_string()));

        let resp = self
            .retrying(|| self.get_checked(EFETCH_URL, &params))
            .await?;
        let xml = resp.text().await?;
        Ok(parse_pubmed_xml(&xml))
    }

    /// Retry a call with bounded doubling backoff on retriable failures.
    async fn retrying<F, Fut, T>(&self, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = BASE_BACKOFF * 2u32.pow(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "PubMed call failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LiteratureSource for PubMedClient {
    async fn search(
        &self,
        query: &str,
        since_days: u32,
        max_results: usize,
    ) -> Result<Vec<String>, SourceError> {
        let since_days = since_days.clamp(1, 365);
        let max_results = max_results.clamp(1, 100);
        self.esearch(query, since_days, max_results).await
    }

    async fn fetch_articles(&self, ids: &[String]) -> Result<Vec<Article>, SourceError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let mut articles = Vec::with_capacity(ids.len());
        for batch in ids.chunks(FETCH_BATCH_SIZE) {
            articles.extend(self.efetch_batch(batch).await?);
        }
        Ok(articles)
    }
}

/// Append the `[PDAT]` trailing-window filter to a query.
fn with_date_window(query: &str, since_days: u32) -> String {
    let end = Utc::now().date_naive();
    let start = end - chrono::Duration::days(since_days as i64);
    format!(
        "({query}) AND {}:{}[PDAT]",
        start.format("%Y/%m/%d"),
        end.format("%Y/%m/%d")
    )
}

// ── XML parsing ───────────────────────────────────────────────────────────────

/// Parse efetch abstract-mode XML into Articles.
///
/// Lenient by design: a record missing its PMID or title is skipped with a
/// warning, and a stream-level parse error ends the scan with whatever was
/// recovered so far. Handles the <PubmedArticleSet><PubmedArticle> structure.
fn parse_pubmed_xml(xml: &str) -> Vec<Article> {
    let mut articles = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // State machine for XML parsing
    let mut current: Option<ArticleBuilder> = None;
    let mut in_pmid       = false;
    let mut in_title      = false;
    let mut in_abstract   = false;
    let mut in_author     = false;
    let mut in_last_name  = false;
    let mut in_fore_name  = false;
    let mut in_journal    = false;
    let mut in_pub_date   = false;
    let mut in_year       = false;
    let mut in_month      = false;
    let mut in_day        = false;
    let mut in_doi        = false;
    let mut in_keyword    = false;
    let mut in_mesh       = false;
    let mut in_descriptor = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"PubmedArticle"  => current = Some(ArticleBuilder::default()),
                b"PMID"           => in_pmid = true,
                b"ArticleTitle"   => in_title = true,
                b"AbstractText"   => in_abstract = true,
                b"Author"         => {
                    in_author = true;
                    if let Some(ref mut a) = current {
                        a.current_last.clear();
                        a.current_fore.clear();
                    }
                }
                b"LastName"       => in_last_name = true,
                b"ForeName"       => in_fore_name = true,
                b"Title"          => in_journal = true,
                b"PubDate"        => in_pub_date = true,
                b"Year"           => in_year = true,
                b"Month"          => in_month = true,
                b"Day"            => in_day = true,
                b"Keyword"        => in_keyword = true,
                b"MeshHeading"    => in_mesh = true,
                b"DescriptorName" => in_descriptor = true,
                b"ArticleId" => {
                    in_doi = matches!(
                        e.try_get_attribute("IdType"),
                        Ok(Some(attr)) if attr.unescape_value().map(|v| v == "doi").unwrap_or(false)
                    );
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                if let Some(ref mut a) = current {
                    // The first PMID in a record is the citation's own; later
                    // ones belong to references and must not overwrite it.
                    if in_pmid && a.pmid.is_none()           { a.pmid = Some(text.clone()); }
                    if in_title                              { a.title.push_str(&text); }
                    if in_abstract                           { a.abstract_parts.push(text.clone()); }
                    if in_last_name                          { a.current_last = text.clone(); }
                    if in_fore_name                          { a.current_fore = text.clone(); }
                    if in_journal && a.journal.is_empty()    { a.journal = text.clone(); }
                    if in_pub_date && in_year                { a.year = Some(text.clone()); }
                    if in_pub_date && in_month               { a.month = Some(text.clone()); }
                    if in_pub_date && in_day                 { a.day = Some(text.clone()); }
                    if in_doi && a.doi.is_none()             { a.doi = Some(text.clone()); }
                    if in_keyword                            { a.keywords.push(text.clone()); }
                    if in_mesh && in_descriptor              { a.mesh_terms.push(text.clone()); }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"PMID"           => in_pmid = false,
                b"ArticleTitle"   => in_title = false,
                b"AbstractText"   => in_abstract = false,
                b"LastName"       => in_last_name = false,
                b"ForeName"       => in_fore_name = false,
                b"Title"          => in_journal = false,
                b"PubDate"        => in_pub_date = false,
                b"Year"           => in_year = false,
                b"Month"          => in_month = false,
                b"Day"            => in_day = false,
                b"ArticleId"      => in_doi = false,
                b"Keyword"        => in_keyword = false,
                b"MeshHeading"    => in_mesh = false,
                b"DescriptorName" => in_descriptor = false,
                b"Author" => {
                    if in_author {
                        if let Some(ref mut a) = current {
                            a.finish_author();
                        }
                        in_author = false;
                    }
                }
                b"PubmedArticle" => {
                    if let Some(builder) = current.take() {
                        match builder.build() {
                            Some(article) => articles.push(article),
                            None => warn!("Skipping record without PMID or title"),
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "XML parse error, keeping records parsed so far");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    articles
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    journal: String,
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    doi: Option<String>,
    keywords: Vec<String>,
    mesh_terms: Vec<String>,
    current_last: String,
    current_fore: String,
}

impl ArticleBuilder {
    /// First 10 authors only, matching the feed's display needs.
    fn finish_author(&mut self) {
        if self.current_last.is_empty() || self.authors.len() >= 10 {
            return;
        }
        let name = if self.current_fore.is_empty() {
            self.current_last.clone()
        } else {
            format!("{} {}", self.current_fore, self.current_last)
        };
        self.authors.push(name);
    }

    fn build(self) -> Option<Article> {
        let pmid = self.pmid?;
        if self.title.is_empty() {
            return None;
        }
        let pub_date = [self.year, self.month, self.day]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        Some(Article {
            pmid,
            title: self.title,
            abstract_text: if self.abstract_parts.is_empty() {
                None
            } else {
                Some(self.abstract_parts.join(" "))
            },
            authors: self.authors,
            journal: self.journal,
            pub_date,
            doi: self.doi,
            keywords: self.keywords,
            mesh_terms: self.mesh_terms,
            fetched_at: Utc::now(),
            quality_score: None,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>12345678</PMID>
      <Article>
        <Journal>
          <Title>Nature Medicine</Title>
          <JournalIssue><PubDate><Year>2025</Year><Month>Jul</Month><Day>14</Day></PubDate></JournalIssue>
        </Journal>
        <ArticleTitle>COVID-19 vaccine durability over 12 months</ArticleTitle>
        <Abstract>
          <AbstractText>Background text.</AbstractText>
          <AbstractText>Results text.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Smith</LastName><ForeName>John</ForeName></Author>
          <Author><LastName>Jones</LastName></Author>
        </AuthorList>
      </Article>
      <MeshHeadingList>
        <MeshHeading><DescriptorName>COVID-19 Vaccines</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <KeywordList><Keyword>immunity</Keyword><Keyword>booster</Keyword></KeywordList>
      <CommentsCorrectionsList>
        <CommentsCorrections><PMID>99999999</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">12345678</ArticleId>
        <ArticleId IdType="doi">10.1038/s41591-025-1</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>22222222</PMID>
      <Article>
        <ArticleTitle>Record without abstract</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>33333333</PMID>
      <Article></Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_full_record() {
        let articles = parse_pubmed_xml(FIXTURE);
        assert_eq!(articles.len(), 2); // titleless record skipped

        let a = &articles[0];
        assert_eq!(a.pmid, "12345678");
        assert_eq!(a.title, "COVID-19 vaccine durability over 12 months");
        assert_eq!(a.abstract_text.as_deref(), Some("Background text. Results text."));
        assert_eq!(a.authors, vec!["John Smith".to_string(), "Jones".to_string()]);
        assert_eq!(a.journal, "Nature Medicine");
        assert_eq!(a.pub_date, "2025 Jul 14");
        assert_eq!(a.doi.as_deref(), Some("10.1038/s41591-025-1"));
        assert_eq!(a.keywords, vec!["immunity".to_string(), "booster".to_string()]);
        assert_eq!(a.mesh_terms, vec!["COVID-19 Vaccines".to_string()]);
    }

    #[test]
    fn test_reference_pmid_does_not_overwrite() {
        let articles = parse_pubmed_xml(FIXTURE);
        assert_eq!(articles[0].pmid, "12345678");
    }

    #[test]
    fn test_record_without_abstract_is_kept() {
        let articles = parse_pubmed_xml(FIXTURE);
        assert_eq!(articles[1].pmid, "22222222");
        assert!(articles[1].abstract_text.is_none());
        assert!(articles[1].authors.is_empty());
    }

    #[test]
    fn test_malformed_xml_keeps_prior_records() {
        let truncated = &FIXTURE[..FIXTURE.find("22222222").unwrap()];
        let articles = parse_pubmed_xml(truncated);
        // The first complete record survives the broken tail
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].pmid, "12345678");
    }

    #[test]
    fn test_empty_input_yields_no_articles() {
        assert!(parse_pubmed_xml("").is_empty());
    }

    #[test]
    fn test_date_window_format() {
        let q = with_date_window("cancer[tiab]", 7);
        assert!(q.starts_with("(cancer[tiab]) AND "));
        assert!(q.ends_with("[PDAT]"));
        assert!(q.contains(':'));
    }

    #[test]
    fn test_author_cap() {
        let mut builder = ArticleBuilder {
            pmid: Some("1".to_string()),
            title: "t".to_string(),
            ..Default::default()
        };
        for i in 0..15 {
            builder.current_last = format!("Author{i}");
            builder.current_fore.clear();
            builder.finish_author();
        }
        assert_eq!(builder.build().unwrap().authors.len(), 10);
    }
}

#[cfg(test)]
mod network_tests {
    use super::*;
    use crate::sources::LiteratureSource;

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_pubmed_search_and_fetch() {
        let client = PubMedClient::new(None);
        let articles = client
            .search_and_fetch("COVID-19[tiab] AND vaccine[tiab]", 30, 5)
            .await
            .expect("PubMed search failed");
        assert!(articles.len() <= 5);
        for article in &articles {
            assert!(!article.pmid.is_empty());
            assert!(!article.title.is_empty());
        }
    }
}
