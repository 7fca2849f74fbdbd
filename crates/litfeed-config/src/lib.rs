//! Configuration loading for litfeed.
//! Reads litfeed.toml from the current directory or path in LITFEED_CONFIG env var.
//!
//! The core pipeline crates never read this file themselves — they receive
//! the loaded structure (or sub-structures) as call arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pubmed: PubMedConfig,
    /// Natural-language research interests searched by default.
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Disables TLS certificate verification for the LLM endpoint.
    /// Off by default; only for broken local proxies.
    #[serde(default)]
    pub danger_disable_tls_verify: bool,
}

fn default_llm_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model()    -> String { "gpt-4o-mini".to_string() }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            danger_disable_tls_verify: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubMedConfig {
    /// Trailing publication window in days (1..=365).
    #[serde(default = "default_search_days")]
    pub search_days: u32,
    /// Result cap per search (1..=100).
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Optional NCBI API key for higher rate limits.
    pub api_key: Option<String>,
    /// Contact email sent in the User-Agent, per NCBI etiquette.
    pub email: Option<String>,
    /// Optional 5-field cron expression for unattended searches.
    pub schedule: Option<String>,
    #[serde(default)]
    pub danger_disable_tls_verify: bool,
}

fn default_search_days() -> u32   { 7 }
fn default_max_results() -> usize { 100 }

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            search_days: default_search_days(),
            max_results: default_max_results(),
            api_key: None,
            email: None,
            schedule: None,
            danger_disable_tls_verify: false,
        }
    }
}

impl PubMedConfig {
    /// Clamp the window and cap to the ranges the remote service accepts.
    pub fn clamped_days(&self) -> u32 {
        self.search_days.clamp(1, 365)
    }

    pub fn clamped_max_results(&self) -> usize {
        self.max_results.clamp(1, 100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
}

fn default_db_path()     -> String { "data/litfeed.db".to_string() }
fn default_reports_dir() -> String { "data/reports".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path(), reports_dir: default_reports_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "127.0.0.1:3001".to_string() }

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl AppConfig {
    /// Load configuration from litfeed.toml.
    /// Checks LITFEED_CONFIG env var first, then the current directory.
    /// A missing file yields the defaults rather than an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("LITFEED_CONFIG")
            .unwrap_or_else(|_| "litfeed.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            tracing::warn!(path = %path.as_ref().display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Owns the config file path; reloads and saves on demand so the web layer
/// can hot-swap settings without restarting.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        let path = std::env::var("LITFEED_CONFIG")
            .unwrap_or_else(|_| "litfeed.toml".to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<AppConfig> {
        AppConfig::load_from(&self.path)
    }

    pub fn save(&self, config: &AppConfig) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_from("/nonexistent/litfeed.toml").unwrap();
        assert_eq!(config.pubmed.search_days, 7);
        assert_eq!(config.pubmed.max_results, 100);
        assert!(config.interests.is_empty());
        assert!(!config.llm.danger_disable_tls_verify);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            interests = ["LLMs in radiology"]

            [llm]
            base_url = "http://localhost:11434/v1"
            model = "llama3:8b"

            [pubmed]
            search_days = 14
            schedule = "0 7 * * *"
            "#,
        )
        .unwrap();
        assert_eq!(config.interests.len(), 1);
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
        assert_eq!(config.pubmed.search_days, 14);
        assert_eq!(config.pubmed.schedule.as_deref(), Some("0 7 * * *"));
        // Untouched sections fall back to defaults
        assert_eq!(config.storage.db_path, "data/litfeed.db");
    }

    #[test]
    fn test_clamping() {
        let pubmed = PubMedConfig { search_days: 0, max_results: 10_000, ..Default::default() };
        assert_eq!(pubmed.clamped_days(), 1);
        assert_eq!(pubmed.clamped_max_results(), 100);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("litfeed.toml");
        let manager = ConfigManager::new(&path);

        let mut config = AppConfig::default();
        config.interests.push("COVID-19 vaccine durability".to_string());
        config.pubmed.search_days = 30;
        manager.save(&config).unwrap();

        let reloaded = manager.load().unwrap();
        assert_eq!(reloaded.interests, config.interests);
        assert_eq!(reloaded.pubmed.search_days, 30);
    }
}
