//! litfeed-report — Assembles dated report bundles from generated content.
//!
//! A report is a directory `reports_dir/YYYY-MM-DD/` holding one file per
//! produced content variant plus an `index.md` enumerating the included
//! articles. Writes are atomic per file (temp file + rename); cross-file
//! atomicity is not required — a partial report is recoverable by
//! regeneration.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use litfeed_common::{
    Article, CancelFlag, Length, LitfeedError, Platform, ReportRecord, Result, VariantKey,
    VariantSet,
};
use litfeed_db::Store;

// ── Slot template ─────────────────────────────────────────────────────────────

/// One slot of the fixed report template.
#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub platform: Platform,
    pub length: Length,
    /// 1-based position among same-kind slots (short slots come in pairs).
    pub position: u8,
    /// Default index into the selected article list.
    pub default_article: usize,
}

/// The fixed template: casual-long×1, casual-short×2, professional-long×1,
/// professional-short×2. Long slots take the first article; the two short
/// slots take the second and third.
pub const SLOT_TEMPLATE: [Slot; 6] = [
    Slot { platform: Platform::Casual,       length: Length::Long,  position: 1, default_article: 0 },
    Slot { platform: Platform::Casual,       length: Length::Short, position: 1, default_article: 1 },
    Slot { platform: Platform::Casual,       length: Length::Short, position: 2, default_article: 2 },
    Slot { platform: Platform::Professional, length: Length::Long,  position: 1, default_article: 0 },
    Slot { platform: Platform::Professional, length: Length::Short, position: 1, default_article: 1 },
    Slot { platform: Platform::Professional, length: Length::Short, position: 2, default_article: 2 },
];

impl Slot {
    pub fn variant_key(&self) -> VariantKey {
        VariantKey::new(self.platform, self.length)
    }

    /// File name for this slot, e.g. `casual_long.md`, `professional_short_2.md`.
    pub fn file_name(&self) -> String {
        match self.length {
            Length::Long => format!("{}_long.md", self.platform.as_str()),
            Length::Short => format!("{}_short_{}.md", self.platform.as_str(), self.position),
        }
    }
}

/// Explicit article-index overrides for each slot, in `SLOT_TEMPLATE` order.
/// `None` keeps the defaults.
#[derive(Debug, Clone)]
pub struct SlotSelection(pub [usize; 6]);

impl Default for SlotSelection {
    fn default() -> Self {
        let mut idx = [0; 6];
        for (i, slot) in SLOT_TEMPLATE.iter().enumerate() {
            idx[i] = slot.default_article;
        }
        Self(idx)
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────────

pub struct ReportAssembler {
    reports_dir: PathBuf,
}

impl ReportAssembler {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self { reports_dir: reports_dir.into() }
    }

    /// Assemble a dated report bundle and persist its record to the store.
    ///
    /// Slots whose article index is out of range are omitted, never an
    /// error: one supplied article yields only the long-form files.
    /// Content for a slot falls back across map lookups in order: exact
    /// article, else nothing (slot omitted with a warning).
    pub async fn create_report(
        &self,
        date: NaiveDate,
        articles: &[Article],
        contents: &HashMap<String, VariantSet>,
        selection: &SlotSelection,
        store: &Store,
        cancel: &CancelFlag,
    ) -> Result<ReportRecord> {
        if articles.is_empty() {
            return Err(LitfeedError::Report("no articles supplied".to_string()));
        }

        let date_key = date.format("%Y-%m-%d").to_string();
        let dir = self.reports_dir.join(&date_key);
        std::fs::create_dir_all(&dir)
            .map_err(|e| LitfeedError::Report(format!("create {}: {e}", dir.display())))?;

        let mut file_paths: BTreeMap<String, String> = BTreeMap::new();

        for (slot, &article_idx) in SLOT_TEMPLATE.iter().zip(selection.0.iter()) {
            let Some(article) = articles.get(article_idx) else {
                continue;
            };
            let slug = slot.variant_key().slug();
            let Some(text) = contents.get(&article.pmid).and_then(|set| set.get(&slug)) else {
                warn!(pmid = %article.pmid, slot = %slug, "No generated content for slot, omitting");
                continue;
            };
            let name = slot.file_name();
            let path = write_atomic(&dir, &name, text)?;
            file_paths.insert(name, path.to_string_lossy().to_string());
        }

        // Index document enumerating included articles and their sources
        let index = render_index(&date_key, articles, &file_paths);
        let index_path = write_atomic(&dir, "index.md", &index)?;
        file_paths.insert("index.md".to_string(), index_path.to_string_lossy().to_string());

        // A cancelled run leaves its files on disk (regeneration overwrites
        // them) but must not be recorded as complete.
        if cancel.is_cancelled() {
            return Err(LitfeedError::Cancelled("report".to_string()));
        }

        let record = ReportRecord {
            id: Uuid::new_v4().to_string(),
            date: date_key,
            article_ids: articles.iter().map(|a| a.pmid.clone()).collect(),
            file_paths,
            article_count: articles.len() as i64,
            created_at: Utc::now(),
        };
        store.save_report(&record).await?;

        info!(
            report_id = %record.id,
            date = %record.date,
            files = record.file_paths.len(),
            articles = record.article_count,
            "Report assembled"
        );
        Ok(record)
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }
}

/// Read one generated report file back.
pub fn read_report(path: impl AsRef<Path>) -> Result<String> {
    std::fs::read_to_string(path.as_ref())
        .map_err(|e| LitfeedError::Report(format!("read {}: {e}", path.as_ref().display())))
}

/// Bundle the files of one or more reports into a zip archive (in memory).
/// Entries are laid out as `<date>/<file name>`. Missing files are skipped
/// with a warning rather than failing the export.
pub fn export_zip(reports: &[ReportRecord]) -> Result<Vec<u8>> {
    use zip::write::SimpleFileOptions;

    let cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(cursor);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for report in reports {
        for (name, path) in &report.file_paths {
            let content = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path, error = %e, "Report file missing, skipping in export");
                    continue;
                }
            };
            let entry = format!("{}/{}", report.date, name);
            writer
                .start_file(entry, options)
                .map_err(|e| LitfeedError::Report(format!("zip entry: {e}")))?;
            writer
                .write_all(&content)
                .map_err(|e| LitfeedError::Report(format!("zip write: {e}")))?;
        }
    }

    let cursor = writer
        .finish()
        .map_err(|e| LitfeedError::Report(format!("zip finish: {e}")))?;
    Ok(cursor.into_inner())
}

/// Atomic per-file write: temp file in the target directory, then rename.
/// A partial write can never replace a prior successful one.
fn write_atomic(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| LitfeedError::Report(format!("temp file in {}: {e}", dir.display())))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| LitfeedError::Report(format!("write {name}: {e}")))?;
    let path = dir.join(name);
    tmp.persist(&path)
        .map_err(|e| LitfeedError::Report(format!("persist {name}: {e}")))?;
    Ok(path)
}

fn render_index(date: &str, articles: &[Article], files: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Literature report: {date}\n\n"));
    out.push_str(&format!("Articles included: {}\n\n", articles.len()));
    for article in articles {
        out.push_str(&format!("- **{}**\n", article.title));
        out.push_str(&format!("  - PMID: {}\n", article.pmid));
        if let Some(doi) = &article.doi {
            out.push_str(&format!("  - DOI: {doi}\n"));
        }
        if !article.journal.is_empty() {
            out.push_str(&format!("  - Journal: {}\n", article.journal));
        }
        out.push_str(&format!("  - Source: {}\n", article.url()));
    }
    out.push_str("\nGenerated files:\n");
    for name in files.keys() {
        out.push_str(&format!("- {name}\n"));
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn article(pmid: &str) -> Article {
        Article {
            pmid: pmid.to_string(),
            title: format!("Article {pmid}"),
            abstract_text: Some("Abstract.".to_string()),
            authors: vec!["A. Author".to_string()],
            journal: "Journal".to_string(),
            pub_date: "2026".to_string(),
            doi: None,
            keywords: vec![],
            mesh_terms: vec![],
            fetched_at: Utc::now(),
            quality_score: None,
        }
    }

    fn contents_for(articles: &[Article]) -> HashMap<String, VariantSet> {
        articles
            .iter()
            .map(|a| {
                let set: VariantSet = VariantKey::all()
                    .iter()
                    .map(|k| (k.slug(), format!("{} for {}", k.slug(), a.pmid)))
                    .collect();
                (a.pmid.clone(), set)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_article_produces_long_forms_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        let assembler = ReportAssembler::new(dir.path());

        let articles = vec![article("100")];
        let contents = contents_for(&articles);
        let record = assembler
            .create_report(
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
                &articles,
                &contents,
                &SlotSelection::default(),
                &store,
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        assert!(record.file_paths.contains_key("casual_long.md"));
        assert!(record.file_paths.contains_key("professional_long.md"));
        assert!(record.file_paths.contains_key("index.md"));
        assert!(!record.file_paths.keys().any(|k| k.contains("short")));
    }

    #[tokio::test]
    async fn test_three_articles_fill_all_slots() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        let assembler = ReportAssembler::new(dir.path());

        let articles: Vec<Article> = ["1", "2", "3"].iter().map(|p| article(p)).collect();
        let contents = contents_for(&articles);
        let record = assembler
            .create_report(
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
                &articles,
                &contents,
                &SlotSelection::default(),
                &store,
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        // 6 template slots + index
        assert_eq!(record.file_paths.len(), 7);

        // Short slots bind the second and third articles
        let short_1 = read_report(&record.file_paths["casual_short_1.md"]).unwrap();
        assert!(short_1.contains("for 2"));
        let short_2 = read_report(&record.file_paths["casual_short_2.md"]).unwrap();
        assert!(short_2.contains("for 3"));

        // Record is persisted
        let stored = store.get_report(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.article_ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_index_lists_articles_and_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        let assembler = ReportAssembler::new(dir.path());

        let articles = vec![article("424242")];
        let contents = contents_for(&articles);
        let record = assembler
            .create_report(
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
                &articles,
                &contents,
                &SlotSelection::default(),
                &store,
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        let index = read_report(&record.file_paths["index.md"]).unwrap();
        assert!(index.contains("424242"));
        assert!(index.contains("pubmed.ncbi.nlm.nih.gov/424242"));
    }

    #[tokio::test]
    async fn test_cancelled_report_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        let assembler = ReportAssembler::new(dir.path());

        let cancel = CancelFlag::new();
        cancel.cancel();

        let articles = vec![article("1")];
        let contents = contents_for(&articles);
        let result = assembler
            .create_report(
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
                &articles,
                &contents,
                &SlotSelection::default(),
                &store,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(LitfeedError::Cancelled(_))));
        assert!(store.get_reports(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_zip_contains_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::in_memory().await.unwrap();
        let assembler = ReportAssembler::new(dir.path());

        let articles = vec![article("1")];
        let contents = contents_for(&articles);
        let record = assembler
            .create_report(
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
                &articles,
                &contents,
                &SlotSelection::default(),
                &store,
                &CancelFlag::new(),
            )
            .await
            .unwrap();

        let bytes = export_zip(std::slice::from_ref(&record)).unwrap();
        assert!(!bytes.is_empty());
        // Zip local-file-header magic
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_regeneration_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_atomic(dir.path(), "casual_long.md", "first").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
        write_atomic(dir.path(), "casual_long.md", "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
