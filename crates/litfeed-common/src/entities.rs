//! Domain entities shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One literature record as fetched from the remote service.
///
/// The PMID is the sole deduplication key; every other field is metadata.
/// Records are never mutated after insertion except for `quality_score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub journal: String,
    pub pub_date: String,
    pub doi: Option<String>,
    pub keywords: Vec<String>,
    pub mesh_terms: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub quality_score: Option<f64>,
}

impl Article {
    /// Canonical PubMed URL for this record.
    pub fn url(&self) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.pmid)
    }
}

/// Target platform style for generated copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Casual,
    Professional,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Casual => "casual",
            Platform::Professional => "professional",
        }
    }
}

/// Length band for generated copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Long,
    Short,
}

impl Length {
    pub fn as_str(&self) -> &'static str {
        match self {
            Length::Long => "long",
            Length::Short => "short",
        }
    }
}

/// One (platform, length) combination, the key of a generated content variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub platform: Platform,
    pub length: Length,
}

impl VariantKey {
    pub fn new(platform: Platform, length: Length) -> Self {
        Self { platform, length }
    }

    /// All four variants, in template order.
    pub fn all() -> [VariantKey; 4] {
        [
            VariantKey::new(Platform::Casual, Length::Long),
            VariantKey::new(Platform::Casual, Length::Short),
            VariantKey::new(Platform::Professional, Length::Long),
            VariantKey::new(Platform::Professional, Length::Short),
        ]
    }

    /// Stable string form used in file names and JSON maps, e.g. `casual_long`.
    pub fn slug(&self) -> String {
        format!("{}_{}", self.platform.as_str(), self.length.as_str())
    }
}

/// The four generated variants for one article, keyed by slug.
pub type VariantSet = BTreeMap<String, String>;

/// One recorded pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    /// The formal query actually sent to the remote service.
    pub query: String,
    /// Original natural-language input, if a raw query was not supplied directly.
    pub natural_language: Option<String>,
    pub total_found: i64,
    pub new_articles: i64,
    pub created_at: DateTime<Utc>,
}

/// A dated bundle of generated files plus an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    /// Bundle date key, `YYYY-MM-DD`.
    pub date: String,
    pub article_ids: Vec<String>,
    /// Generated file name -> path on disk.
    pub file_paths: BTreeMap<String, String>,
    pub article_count: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_url() {
        let article = Article {
            pmid: "12345678".to_string(),
            title: "Test".to_string(),
            abstract_text: None,
            authors: vec![],
            journal: String::new(),
            pub_date: String::new(),
            doi: None,
            keywords: vec![],
            mesh_terms: vec![],
            fetched_at: Utc::now(),
            quality_score: None,
        };
        assert_eq!(article.url(), "https://pubmed.ncbi.nlm.nih.gov/12345678/");
    }

    #[test]
    fn test_variant_key_slugs() {
        let slugs: Vec<String> = VariantKey::all().iter().map(|k| k.slug()).collect();
        assert_eq!(
            slugs,
            vec!["casual_long", "casual_short", "professional_long", "professional_short"]
        );
    }
}
