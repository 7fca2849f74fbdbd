//! Command-line entry point for the literature feed.
//!
//! Default action runs the full pipeline for the configured interests (or a
//! single `-i` interest) and writes a dated report. `--dry-run` searches and
//! prints candidates without persisting anything or calling the content
//! model.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use litfeed_common::CancelFlag;
use litfeed_config::AppConfig;
use litfeed_db::Store;
use litfeed_ingestion::pipeline::{run_feed, SearchJob};
use litfeed_ingestion::sources::pubmed::PubMedClient;
use litfeed_ingestion::LiteratureSource;
use litfeed_llm::{ContentGenerator, OpenAiCompatibleBackend, QueryGenerator};
use litfeed_report::ReportAssembler;

#[derive(Parser, Debug)]
#[command(name = "litfeed", version, about = "PubMed literature aggregation and content generation")]
struct Cli {
    /// Search a single interest instead of the configured list
    #[arg(short, long)]
    interest: Option<String>,

    /// Search window in days (overrides config)
    #[arg(short = 'd', long)]
    days: Option<u32>,

    /// Maximum number of results (overrides config)
    #[arg(short = 'm', long)]
    max: Option<usize>,

    /// Preview an article's metadata by PMID
    #[arg(long, value_name = "PMID")]
    preview: Option<String>,

    /// Show recent search history
    #[arg(long)]
    history: bool,

    /// Show the current configuration
    #[arg(long)]
    config: bool,

    /// Search only: no content generation, nothing persisted
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    if cli.config {
        print_config(&config);
        return Ok(());
    }

    if let Some(pmid) = &cli.preview {
        return preview_article(&config, pmid).await;
    }

    if cli.history {
        return list_history(&config).await;
    }

    run_search_command(&config, &cli).await
}

fn print_config(config: &AppConfig) {
    println!("Configuration:");
    println!("  LLM endpoint : {}", config.llm.base_url);
    println!("  Model        : {}", config.llm.model);
    println!("  Search days  : {}", config.pubmed.search_days);
    println!("  Max results  : {}", config.pubmed.max_results);
    println!("  Schedule     : {}", config.pubmed.schedule.as_deref().unwrap_or("none"));
    println!("  Interests    : {}", config.interests.len());
    for (i, interest) in config.interests.iter().enumerate() {
        println!("    {}. {}", i + 1, interest);
    }
}

async fn preview_article(config: &AppConfig, pmid: &str) -> anyhow::Result<()> {
    let client = PubMedClient::from_config(&config.pubmed);
    let articles = client.fetch_articles(&[pmid.to_string()]).await?;
    let Some(article) = articles.first() else {
        anyhow::bail!("article {pmid} not found");
    };

    println!("Title   : {}", article.title);
    println!("Authors : {}", article.authors.join(", "));
    println!("Journal : {}", article.journal);
    println!("Date    : {}", article.pub_date);
    println!("Link    : {}", article.url());
    if let Some(abstract_text) = &article.abstract_text {
        let head: String = abstract_text.chars().take(500).collect();
        println!("\nAbstract:\n{head}…");
    }
    Ok(())
}

async fn list_history(config: &AppConfig) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.db_path).await?;
    let history = store.get_search_history(50).await?;
    if history.is_empty() {
        println!("No search history.");
        return Ok(());
    }
    for entry in history {
        println!(
            "#{:<4} {}  found {:>3}  new {:>3}  {}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.total_found,
            entry.new_articles,
            entry.natural_language.as_deref().unwrap_or(&entry.query),
        );
    }
    Ok(())
}

async fn run_search_command(config: &AppConfig, cli: &Cli) -> anyhow::Result<()> {
    let interests = match &cli.interest {
        Some(interest) => vec![interest.clone()],
        None => config.interests.clone(),
    };
    if interests.is_empty() {
        anyhow::bail!("no interests configured; pass -i or add some to litfeed.toml");
    }

    let job = SearchJob {
        interests,
        raw_query: None,
        since_days: cli.days.unwrap_or_else(|| config.pubmed.clamped_days()),
        max_results: cli.max.unwrap_or_else(|| config.pubmed.clamped_max_results()),
    };

    let backend = Arc::new(OpenAiCompatibleBackend::from_config(&config.llm));
    let querygen = QueryGenerator::new(backend.clone());
    let client = PubMedClient::from_config(&config.pubmed);

    if cli.dry_run {
        return dry_run(&job, &querygen, &client, config).await;
    }

    let store = Store::open(&config.storage.db_path).await?;
    let content = ContentGenerator::new(backend);
    let assembler = ReportAssembler::new(&config.storage.reports_dir);

    // Ctrl-C cancels between pipeline stages; finished upserts stay durable.
    let cancel = CancelFlag::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current stage…");
            ctrl_c_cancel.cancel();
        }
    });

    // Print pipeline progress as it happens
    let (tx, mut rx) = tokio::sync::broadcast::channel::<litfeed_ingestion::FeedEvent>(64);
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("[{}] {}", event.stage, event.message);
        }
    });

    let result = run_feed(
        &job,
        &store,
        &querygen,
        &content,
        &client,
        &assembler,
        &cancel,
        Some(&tx),
    )
    .await;
    drop(tx);
    let _ = printer.await;

    let (outcome, report) = result?;

    println!();
    println!("Query      : {}", outcome.query);
    println!("Found      : {}", outcome.total_found);
    println!("New        : {}", outcome.new_articles.len());
    for error in &outcome.errors {
        println!("Degraded   : {error}");
    }

    if let Some(report) = report {
        println!("Report     : {} ({} files)", report.id, report.file_paths.len());
        write_summary(&report, &outcome.new_articles)?;
    } else {
        println!("No new articles; no report generated.");
    }
    Ok(())
}

async fn dry_run(
    job: &SearchJob,
    querygen: &QueryGenerator,
    client: &PubMedClient,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("[dry-run] Nothing will be persisted and no content is generated.");
    let queries = querygen.generate_queries(&job.interests).await;
    let query = QueryGenerator::combine_queries(&queries);
    println!("Query: {query}");

    let ids = client.search(&query, job.since_days, job.max_results).await?;
    println!("Found {} identifiers", ids.len());

    // Still report which of them would be new
    let store = Store::open(&config.storage.db_path).await?;
    let new_ids = store.filter_new(&ids).await?;
    println!("Of those, {} are new", new_ids.len());

    let articles = client.fetch_articles(&new_ids).await?;
    for article in &articles {
        println!("- {} ({})", article.title, article.pmid);
    }
    Ok(())
}

fn write_summary(
    report: &litfeed_common::ReportRecord,
    articles: &[litfeed_common::Article],
) -> anyhow::Result<()> {
    use std::path::Path;
    let Some(first_file) = report.file_paths.values().next() else {
        return Ok(());
    };
    let Some(dir) = Path::new(first_file).parent() else {
        return Ok(());
    };

    let mut summary = String::new();
    summary.push_str("Literature search report\n");
    summary.push_str(&format!("Report id : {}\n", report.id));
    summary.push_str(&format!("Generated : {}\n", report.created_at.to_rfc3339()));
    summary.push_str(&format!("Articles  : {}\n\nArticle list:\n", report.article_count));
    for article in articles {
        summary.push_str(&format!("\n- {}\n", article.title));
        summary.push_str(&format!("  PMID   : {}\n", article.pmid));
        summary.push_str(&format!("  Journal: {}\n", article.journal));
        summary.push_str(&format!("  Link   : {}\n", article.url()));
    }

    let path = dir.join(format!("summary_{}.txt", report.id));
    std::fs::write(&path, summary)?;
    println!("Summary    : {}", path.display());
    Ok(())
}
