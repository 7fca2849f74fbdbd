//! SQLite-backed deduplication store.
//!
//! JSON-encoded list columns (authors, keywords, mesh_terms) are an encoding
//! detail of this layer only; the domain model always sees typed Vec<String>.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::warn;

use litfeed_common::{Article, ReportRecord, SearchHistoryEntry};

use crate::error::Result;

/// Store handle. Cheap to clone; all clones share one pool and one writer
/// lock. Two concurrent runs upserting the same identifier serialize on the
/// lock rather than racing on the row.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Open or create the database file, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    sqlx::Error::Io(e)
                })?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool, write_lock: Arc::new(Mutex::new(())) };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive for the pool's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool, write_lock: Arc::new(Mutex::new(())) };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                pmid          TEXT PRIMARY KEY,
                title         TEXT NOT NULL,
                abstract_text TEXT,
                authors       TEXT NOT NULL DEFAULT '[]',
                journal       TEXT NOT NULL DEFAULT '',
                pub_date      TEXT NOT NULL DEFAULT '',
                doi           TEXT,
                keywords      TEXT NOT NULL DEFAULT '[]',
                mesh_terms    TEXT NOT NULL DEFAULT '[]',
                fetched_at    TEXT NOT NULL,
                quality_score REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id            TEXT PRIMARY KEY,
                date          TEXT NOT NULL,
                article_ids   TEXT NOT NULL DEFAULT '[]',
                file_paths    TEXT NOT NULL DEFAULT '{}',
                article_count INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_history (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                query            TEXT NOT NULL,
                natural_language TEXT,
                total_found      INTEGER NOT NULL DEFAULT 0,
                new_articles     INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Article operations ───────────────────────────────────────────────────

    /// Return the subset of `pmids` not already present, preserving order.
    /// Pure membership on identifier equality; no other field matters.
    pub async fn filter_new(&self, pmids: &[String]) -> Result<Vec<String>> {
        let mut new_ids = Vec::new();
        for pmid in pmids {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM articles WHERE pmid = ?1")
                    .bind(pmid)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                new_ids.push(pmid.clone());
            }
        }
        Ok(new_ids)
    }

    /// Persist new articles. Idempotent: an already-present identifier is a
    /// no-op, never a duplicate row. Returns the number actually inserted.
    pub async fn upsert_articles(&self, articles: &[Article]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut inserted = 0;
        for article in articles {
            let result = sqlx::query(
                r#"
                INSERT INTO articles
                    (pmid, title, abstract_text, authors, journal, pub_date,
                     doi, keywords, mesh_terms, fetched_at, quality_score)
                VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
                ON CONFLICT(pmid) DO NOTHING
                "#,
            )
            .bind(&article.pmid)
            .bind(&article.title)
            .bind(&article.abstract_text)
            .bind(serde_json::to_string(&article.authors)?)
            .bind(&article.journal)
            .bind(&article.pub_date)
            .bind(&article.doi)
            .bind(serde_json::to_string(&article.keywords)?)
            .bind(serde_json::to_string(&article.mesh_terms)?)
            .bind(article.fetched_at)
            .bind(article.quality_score)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    /// The only permitted post-insert mutation.
    pub async fn set_quality_score(&self, pmid: &str, score: f64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE articles SET quality_score = ?1 WHERE pmid = ?2")
            .bind(score)
            .bind(pmid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Absence is None, not an error.
    pub async fn get_article(&self, pmid: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE pmid = ?1")
            .bind(pmid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_article(&r)).transpose()
    }

    pub async fn get_articles(&self, limit: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query("SELECT * FROM articles ORDER BY fetched_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_article).collect()
    }

    // ── Search history ───────────────────────────────────────────────────────

    /// Record one pipeline invocation. Returns the new history id.
    pub async fn save_search_history(
        &self,
        query: &str,
        natural_language: Option<&str>,
        total_found: i64,
        new_articles: i64,
    ) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            r#"
            INSERT INTO search_history (query, natural_language, total_found, new_articles, created_at)
            VALUES (?1,?2,?3,?4,?5)
            "#,
        )
        .bind(query)
        .bind(natural_language)
        .bind(total_found)
        .bind(new_articles)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_search_history(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        let rows = sqlx::query("SELECT * FROM search_history ORDER BY created_at DESC, id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_history).collect()
    }

    /// Delete one history entry; never cascades to articles.
    pub async fn delete_search_history(&self, id: i64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM search_history WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Reports ──────────────────────────────────────────────────────────────

    pub async fn save_report(&self, report: &ReportRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO reports (id, date, article_ids, file_paths, article_count, created_at)
            VALUES (?1,?2,?3,?4,?5,?6)
            ON CONFLICT(id) DO UPDATE SET
                article_ids   = excluded.article_ids,
                file_paths    = excluded.file_paths,
                article_count = excluded.article_count
            "#,
        )
        .bind(&report.id)
        .bind(&report.date)
        .bind(serde_json::to_string(&report.article_ids)?)
        .bind(serde_json::to_string(&report.file_paths)?)
        .bind(report.article_count)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_reports(&self, limit: i64) -> Result<Vec<ReportRecord>> {
        let rows = sqlx::query("SELECT * FROM reports ORDER BY created_at DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_report).collect()
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<ReportRecord>> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_report(&r)).transpose()
    }

    // ── Stats ────────────────────────────────────────────────────────────────

    pub async fn stats(&self) -> Result<StoreStats> {
        let articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        let reports: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;
        let searches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_history")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            r#"
            SELECT date(fetched_at) AS day, COUNT(*) AS n
            FROM articles
            GROUP BY date(fetched_at)
            ORDER BY day DESC
            LIMIT 30
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut articles_by_date = Vec::with_capacity(rows.len());
        for row in rows {
            let day: Option<String> = row.try_get("day")?;
            let n: i64 = row.try_get("n")?;
            articles_by_date.push((day.unwrap_or_default(), n));
        }
        Ok(StoreStats { articles, reports, searches, articles_by_date })
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub articles: i64,
    pub reports: i64,
    pub searches: i64,
    /// (YYYY-MM-DD, count), most recent first, capped at 30 days.
    pub articles_by_date: Vec<(String, i64)>,
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Malformed JSON list column, treating as empty");
        Vec::new()
    })
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    let authors: String = row.try_get("authors")?;
    let keywords: String = row.try_get("keywords")?;
    let mesh_terms: String = row.try_get("mesh_terms")?;
    Ok(Article {
        pmid: row.try_get("pmid")?,
        title: row.try_get("title")?,
        abstract_text: row.try_get("abstract_text")?,
        authors: decode_list(&authors),
        journal: row.try_get("journal")?,
        pub_date: row.try_get("pub_date")?,
        doi: row.try_get("doi")?,
        keywords: decode_list(&keywords),
        mesh_terms: decode_list(&mesh_terms),
        fetched_at: row.try_get::<DateTime<Utc>, _>("fetched_at")?,
        quality_score: row.try_get("quality_score")?,
    })
}

fn row_to_history(row: &SqliteRow) -> Result<SearchHistoryEntry> {
    Ok(SearchHistoryEntry {
        id: row.try_get("id")?,
        query: row.try_get("query")?,
        natural_language: row.try_get("natural_language")?,
        total_found: row.try_get("total_found")?,
        new_articles: row.try_get("new_articles")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn row_to_report(row: &SqliteRow) -> Result<ReportRecord> {
    let article_ids: String = row.try_get("article_ids")?;
    let file_paths: String = row.try_get("file_paths")?;
    Ok(ReportRecord {
        id: row.try_get("id")?,
        date: row.try_get("date")?,
        article_ids: serde_json::from_str(&article_ids)?,
        file_paths: serde_json::from_str::<BTreeMap<String, String>>(&file_paths)?,
        article_count: row.try_get("article_count")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn article(pmid: &str) -> Article {
        Article {
            pmid: pmid.to_string(),
            title: format!("Article {pmid}"),
            abstract_text: Some("An abstract.".to_string()),
            authors: vec!["Jane Doe".to_string()],
            journal: "Test Journal".to_string(),
            pub_date: "2025 Aug".to_string(),
            doi: Some(format!("10.1000/{pmid}")),
            keywords: vec!["kw".to_string()],
            mesh_terms: vec!["Mesh Term".to_string()],
            fetched_at: Utc::now(),
            quality_score: Some(70.0),
        }
    }

    #[tokio::test]
    async fn test_filter_new_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        let ids = vec!["1".to_string(), "2".to_string()];
        let first = store.filter_new(&ids).await.unwrap();
        let second = store.filter_new(&ids).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, ids);
    }

    #[tokio::test]
    async fn test_upsert_then_filter_new_returns_empty() {
        let store = Store::in_memory().await.unwrap();
        let articles: Vec<Article> = ["10", "11", "12"].iter().map(|p| article(p)).collect();
        let ids: Vec<String> = articles.iter().map(|a| a.pmid.clone()).collect();

        assert_eq!(store.filter_new(&ids).await.unwrap(), ids);
        store.upsert_articles(&articles).await.unwrap();
        assert!(store.filter_new(&ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        let a = article("42");
        assert_eq!(store.upsert_articles(std::slice::from_ref(&a)).await.unwrap(), 1);
        assert_eq!(store.upsert_articles(std::slice::from_ref(&a)).await.unwrap(), 0);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.articles, 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_row() {
        let store = Store::in_memory().await.unwrap();
        let a = article("777");
        let (s1, s2) = (store.clone(), store.clone());
        let (a1, a2) = (a.clone(), a.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.upsert_articles(&[a1]).await }),
            tokio::spawn(async move { s2.upsert_articles(&[a2]).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.articles, 1);
        let stored = store.get_article("777").await.unwrap().unwrap();
        assert_eq!(stored.title, a.title);
        assert_eq!(stored.authors, a.authors);
    }

    #[tokio::test]
    async fn test_get_article_round_trips_list_columns() {
        let store = Store::in_memory().await.unwrap();
        let a = article("314");
        store.upsert_articles(std::slice::from_ref(&a)).await.unwrap();
        let stored = store.get_article("314").await.unwrap().unwrap();
        assert_eq!(stored.keywords, a.keywords);
        assert_eq!(stored.mesh_terms, a.mesh_terms);
        assert_eq!(stored.doi, a.doi);
    }

    #[tokio::test]
    async fn test_get_article_absent_is_none() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.get_article("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quality_score_is_only_mutation() {
        let store = Store::in_memory().await.unwrap();
        let a = article("55");
        store.upsert_articles(std::slice::from_ref(&a)).await.unwrap();
        store.set_quality_score("55", 92.5).await.unwrap();
        let stored = store.get_article("55").await.unwrap().unwrap();
        assert_eq!(stored.quality_score, Some(92.5));
        assert_eq!(stored.title, a.title);
    }

    #[tokio::test]
    async fn test_search_history_crud() {
        let store = Store::in_memory().await.unwrap();
        let id = store
            .save_search_history("q1", Some("natural input"), 10, 3)
            .await
            .unwrap();
        assert!(id > 0);

        let history = store.get_search_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "q1");
        assert_eq!(history[0].natural_language.as_deref(), Some("natural input"));
        assert_eq!(history[0].total_found, 10);
        assert_eq!(history[0].new_articles, 3);

        assert!(store.delete_search_history(id).await.unwrap());
        assert!(!store.delete_search_history(id).await.unwrap());
        assert!(store.get_search_history(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_round_trip() {
        let store = Store::in_memory().await.unwrap();
        let mut file_paths = BTreeMap::new();
        file_paths.insert("casual_long".to_string(), "data/reports/2026-08-07/casual_long.md".to_string());
        let record = ReportRecord {
            id: uuid::Uuid::new_v4().to_string(),
            date: "2026-08-07".to_string(),
            article_ids: vec!["1".to_string(), "2".to_string()],
            file_paths,
            article_count: 2,
            created_at: Utc::now(),
        };
        store.save_report(&record).await.unwrap();

        let fetched = store.get_report(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.article_ids, record.article_ids);
        assert_eq!(fetched.file_paths, record.file_paths);

        let all = store.get_reports(10).await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
