//! Natural-language interest → PubMed query translation.
//!
//! Translation is lossy and model-dependent, so every operation here has a
//! non-fatal degradation path: a failed or unusable generation falls back to
//! the interest text as a literal `[Title/Abstract]` term.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::backend::{LlmBackend, LlmError, LlmRequest, Message};

const SYSTEM_PROMPT: &str = "\
You are an expert in medical literature search and PubMed query syntax.

Convert natural-language descriptions of research interests into optimized \
PubMed search queries.

Guidelines:
1. Use MeSH terms when appropriate
2. Include both exact phrases (in quotes) and related keywords
3. Use Boolean operators (AND, OR, NOT) effectively
4. Add field tags like [Title/Abstract], [MeSH Terms] when helpful
5. Keep the query focused but comprehensive
6. Target healthcare and medicine research areas

Examples:
Input: AI in cancer diagnosis
Output: (\"artificial intelligence\" OR \"machine learning\" OR \"deep learning\") AND (cancer OR neoplasm OR tumor) AND (diagnosis OR detection OR screening)[Title/Abstract]

Input: COVID-19 vaccine durability
Output: (\"COVID-19\" OR \"SARS-CoV-2\") AND (vaccine OR vaccination OR immunization) AND (durability OR \"waning immunity\" OR \"antibody persistence\")[Title/Abstract]

Return ONLY the query string, no explanation.";

pub struct QueryGenerator {
    backend: Arc<dyn LlmBackend>,
}

impl QueryGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Literal fallback used when generation fails: the interest itself as a
    /// title/abstract term. Degraded but never fatal.
    pub fn fallback_query(interest: &str) -> String {
        format!("({})[Title/Abstract]", interest.trim())
    }

    /// Generate a PubMed query from one natural-language interest.
    /// Fails if the model call errors or returns nothing usable; callers are
    /// expected to substitute `fallback_query`.
    pub async fn generate_query(&self, interest: &str) -> Result<String, LlmError> {
        let req = LlmRequest {
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(interest),
            ],
            max_tokens: Some(500),
            temperature: Some(0.3),
        };
        let resp = self.backend.complete(req).await?;
        let query = extract_query(&resp.content).ok_or(LlmError::EmptyOutput)?;
        debug!(interest, query = %query, "Generated PubMed query");
        Ok(query)
    }

    /// Generate queries for multiple interests, preserving input order.
    /// Each failing interest falls back independently; the batch never aborts.
    pub async fn generate_queries(&self, interests: &[String]) -> Vec<String> {
        let mut queries = Vec::with_capacity(interests.len());
        for interest in interests {
            let query = match self.generate_query(interest).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(interest, error = %e, "Query generation failed, using literal fallback");
                    Self::fallback_query(interest)
                }
            };
            queries.push(query);
        }
        queries
    }

    /// Join non-empty queries with logical OR. Empty input yields an empty
    /// query, which callers treat as "no search to perform".
    pub fn combine_queries(queries: &[String]) -> String {
        let non_empty: Vec<&str> = queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .collect();
        match non_empty.len() {
            0 => String::new(),
            1 => non_empty[0].to_string(),
            _ => non_empty
                .iter()
                .map(|q| format!("({q})"))
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

/// Pull a query expression out of free-form model output.
///
/// Models wrap answers in code fences or prefix them with prose like
/// "Output:"; the query itself is the first line that survives stripping.
fn extract_query(raw: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)```").expect("fence regex")
    });

    let text = match fence.captures(raw).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => raw.to_string(),
    };

    for line in text.lines() {
        let mut line = line.trim();
        for prefix in ["Output:", "Query:", "PubMed query:"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                line = rest.trim();
            }
        }
        if line.is_empty() {
            continue;
        }
        return Some(line.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedBackend(Result<String, ()>);

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn complete(&self, _req: LlmRequest) -> Result<crate::backend::LlmResponse, LlmError> {
            match &self.0 {
                Ok(content) => Ok(crate::backend::LlmResponse {
                    content: content.clone(),
                    model: "test".to_string(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                }),
                Err(()) => Err(LlmError::Unavailable("forced failure".to_string())),
            }
        }

        fn model_id(&self) -> &str { "test" }
    }

    #[test]
    fn test_combine_empty() {
        assert_eq!(QueryGenerator::combine_queries(&[]), "");
    }

    #[test]
    fn test_combine_single_unchanged() {
        let q = "KRAS[tiab] AND cancer[tiab]".to_string();
        assert_eq!(QueryGenerator::combine_queries(&[q.clone()]), q);
    }

    #[test]
    fn test_combine_pair_joined_with_or() {
        let combined = QueryGenerator::combine_queries(&[
            "q1".to_string(),
            "q2".to_string(),
        ]);
        assert_eq!(combined, "(q1) OR (q2)");
    }

    #[test]
    fn test_combine_skips_empty_entries() {
        let combined = QueryGenerator::combine_queries(&[
            "q1".to_string(),
            "  ".to_string(),
            "q2".to_string(),
        ]);
        assert_eq!(combined, "(q1) OR (q2)");
    }

    #[test]
    fn test_extract_query_plain() {
        assert_eq!(
            extract_query("(\"LLM\") AND (radiology)[Title/Abstract]").as_deref(),
            Some("(\"LLM\") AND (radiology)[Title/Abstract]")
        );
    }

    #[test]
    fn test_extract_query_from_fenced_output() {
        let fenced = "```\n(\"LLM\") AND (oncology)\n```";
        assert_eq!(extract_query(fenced).as_deref(), Some("(\"LLM\") AND (oncology)"));
        // Fence content wins even when surrounded by prose
        let raw = "Here is your query:\n```\n(\"LLM\") AND (oncology)\n```";
        assert_eq!(extract_query(raw).as_deref(), Some("(\"LLM\") AND (oncology)"));
    }

    #[test]
    fn test_extract_query_strips_output_prefix() {
        assert_eq!(
            extract_query("Output: (vaccine)[Title/Abstract]").as_deref(),
            Some("(vaccine)[Title/Abstract]")
        );
    }

    #[test]
    fn test_extract_query_empty_is_none() {
        assert!(extract_query("   \n  ").is_none());
    }

    #[test]
    fn test_fallback_query_shape() {
        assert_eq!(
            QueryGenerator::fallback_query("diabetes care"),
            "(diabetes care)[Title/Abstract]"
        );
    }

    #[tokio::test]
    async fn test_generate_queries_falls_back_per_interest() {
        let generator = QueryGenerator::new(Arc::new(FixedBackend(Err(()))));
        let interests = vec!["AI in cancer diagnosis".to_string()];
        let queries = generator.generate_queries(&interests).await;
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], "(AI in cancer diagnosis)[Title/Abstract]");
    }

    #[tokio::test]
    async fn test_generate_query_uses_model_output() {
        let generator = QueryGenerator::new(Arc::new(FixedBackend(Ok(
            "(\"COVID-19\") AND (vaccine)[Title/Abstract]".to_string(),
        ))));
        let q = generator.generate_query("COVID-19 vaccine durability").await.unwrap();
        assert!(q.contains("COVID-19"));
        assert!(q.contains("vaccine"));
    }
}
