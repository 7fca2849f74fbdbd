//! Platform-tailored copy generation.
//!
//! Four variants per article: {casual, professional} × {long, short}. Each is
//! an independent model call with its own prompt and length band; a failed
//! call degrades to the deterministic fallback template for that variant and
//! never surfaces an error to report assembly.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use litfeed_common::{Article, Length, Platform, VariantKey, VariantSet};

use crate::backend::{LlmBackend, LlmRequest, Message};
use crate::fallback;

pub struct ContentGenerator {
    backend: Arc<dyn LlmBackend>,
}

impl ContentGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Generate one variant. On any model failure the deterministic fallback
    /// is returned instead; this method never fails.
    pub async fn generate(&self, article: &Article, platform: Platform, length: Length) -> String {
        let (system, prompt, max_tokens) = build_prompt(article, platform, length);
        let req = LlmRequest {
            messages: vec![Message::system(system), Message::user(prompt)],
            max_tokens: Some(max_tokens),
            temperature: Some(0.7),
        };
        match self.backend.complete(req).await {
            Ok(resp) => resp.content.trim().to_string(),
            Err(e) => {
                warn!(
                    pmid = %article.pmid,
                    platform = platform.as_str(),
                    length = length.as_str(),
                    error = %e,
                    "Content generation failed, using fallback template"
                );
                fallback::render(article, platform, length)
            }
        }
    }

    /// Generate all four variants concurrently. The calls are independent;
    /// one failing variant never affects the other three.
    pub async fn generate_all(&self, article: &Article) -> VariantSet {
        let [k0, k1, k2, k3] = VariantKey::all();
        let (v0, v1, v2, v3) = tokio::join!(
            self.generate(article, k0.platform, k0.length),
            self.generate(article, k1.platform, k1.length),
            self.generate(article, k2.platform, k2.length),
            self.generate(article, k3.platform, k3.length),
        );
        let mut out = BTreeMap::new();
        out.insert(k0.slug(), v0);
        out.insert(k1.slug(), v1);
        out.insert(k2.slug(), v2);
        out.insert(k3.slug(), v3);
        out
    }
}

/// Build (system prompt, user prompt, max_tokens) for one variant.
fn build_prompt(article: &Article, platform: Platform, length: Length) -> (String, String, u32) {
    let abstract_text = article.abstract_text.as_deref().unwrap_or("No abstract available");
    let keywords = if article.keywords.is_empty() {
        "N/A".to_string()
    } else {
        article.keywords.iter().take(5).cloned().collect::<Vec<_>>().join(", ")
    };

    match (platform, length) {
        (Platform::Casual, Length::Long) => (
            "You are a science communicator writing social-feed posts about new \
             medical research. Your tone is lively and curious, with well-placed \
             emoji, aimed at technology enthusiasts."
                .to_string(),
            format!(
                "Write a casual social-media post about this medical research paper \
                 (200-300 characters).\n\n\
                 Requirements:\n\
                 1. Open with an attention-grabbing headline and an emoji\n\
                 2. Highlight the technical breakthrough and key numbers\n\
                 3. Note one limitation or caveat\n\
                 4. End with a pointer to the original paper\n\
                 5. Add 3-5 topic hashtags\n\n\
                 Paper:\n\
                 Title: {title}\n\
                 Journal: {journal}\n\
                 Abstract: {abstract_short}\n\
                 Keywords: {keywords}\n\
                 Link: {url}",
                title = article.title,
                journal = article.journal,
                abstract_short = head(abstract_text, 1000),
                keywords = keywords,
                url = article.url(),
            ),
            1000,
        ),
        (Platform::Casual, Length::Short) => (
            "You are a science-news poster who distills papers into punchy \
             bulletins. Precise numbers, minimal words."
                .to_string(),
            format!(
                "Write a very short news-flash post about this paper (80-120 \
                 characters).\n\n\
                 Requirements:\n\
                 1. One sentence capturing the core finding\n\
                 2. Two or three key numbers if present\n\
                 3. Two emoji and a link pointer\n\n\
                 Paper:\n\
                 Title: {title}\n\
                 Journal: {journal}\n\
                 Key info: {abstract_short}\n\
                 Link: {url}",
                title = article.title,
                journal = article.journal,
                abstract_short = head(abstract_text, 500),
                url = article.url(),
            ),
            500,
        ),
        (Platform::Professional, Length::Long) => (
            "You are a professional medical-AI writer producing in-depth article \
             digests for clinicians and researchers. Rigorous, structured, \
             statistically literate."
                .to_string(),
            format!(
                "Write an in-depth professional digest of this paper (800-1200 \
                 characters) with these sections:\n\
                 1. Background: why the study was done\n\
                 2. Methods: the technical approach in brief\n\
                 3. Key results: keep every statistic (p values, CIs, effect \
                    sizes) and add a one-sentence plain-language reading of each\n\
                 4. Clinical significance\n\
                 5. Limitations and outlook\n\
                 Close with the citation line and source link.\n\n\
                 Paper:\n\
                 Title: {title}\n\
                 Authors: {authors}\n\
                 Journal: {journal}\n\
                 Published: {pub_date}\n\
                 Abstract: {abstract_text}\n\
                 Keywords: {keywords}\n\
                 MeSH terms: {mesh}\n\
                 PMID: {pmid}\n\
                 DOI: {doi}\n\
                 Link: {url}",
                title = article.title,
                authors = article.authors.iter().take(5).cloned().collect::<Vec<_>>().join(", "),
                journal = article.journal,
                pub_date = article.pub_date,
                abstract_text = abstract_text,
                keywords = keywords,
                mesh = article.mesh_terms.iter().take(10).cloned().collect::<Vec<_>>().join(", "),
                pmid = article.pmid,
                doi = article.doi.as_deref().unwrap_or("N/A"),
                url = article.url(),
            ),
            2000,
        ),
        (Platform::Professional, Length::Short) => (
            "You are a medical-news editor writing concise research briefings for \
             busy clinicians. Keep core statistics and explain what they mean."
                .to_string(),
            format!(
                "Write a concise professional briefing on this paper (300-500 \
                 characters):\n\
                 1. One-line title\n\
                 2. Brief background\n\
                 3. Core data with interpretation\n\
                 4. Practical relevance\n\
                 End with the source link.\n\n\
                 Paper:\n\
                 Title: {title}\n\
                 Journal: {journal}\n\
                 Abstract: {abstract_short}\n\
                 PMID: {pmid}\n\
                 Link: {url}",
                title = article.title,
                journal = article.journal,
                abstract_short = head(abstract_text, 1500),
                pmid = article.pmid,
                url = article.url(),
            ),
            800,
        ),
    }
}

fn head(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LlmError, LlmResponse};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingBackend;

    #[async_trait]
    impl LlmBackend for FailingBackend {
        async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
            Err(LlmError::Unavailable("forced failure".to_string()))
        }

        fn model_id(&self) -> &str { "failing" }
    }

    fn test_article(abstract_text: Option<&str>) -> Article {
        Article {
            pmid: "31452104".to_string(),
            title: "Deep learning for diabetic retinopathy screening".to_string(),
            abstract_text: abstract_text.map(String::from),
            authors: vec!["Jane Doe".to_string(), "John Smith".to_string()],
            journal: "The Lancet Digital Health".to_string(),
            pub_date: "2025 Jul".to_string(),
            doi: Some("10.1000/ldh.2025.1".to_string()),
            keywords: vec!["deep learning".to_string()],
            mesh_terms: vec!["Diabetic Retinopathy".to_string()],
            fetched_at: Utc::now(),
            quality_score: None,
        }
    }

    #[tokio::test]
    async fn test_generate_falls_back_on_failure() {
        let generator = ContentGenerator::new(Arc::new(FailingBackend));
        let article = test_article(Some("An abstract."));
        let text = generator.generate(&article, Platform::Casual, Length::Long).await;
        assert!(!text.is_empty());
        assert!(text.contains("pubmed.ncbi.nlm.nih.gov/31452104"));
    }

    #[tokio::test]
    async fn test_generate_all_with_null_abstract() {
        let generator = ContentGenerator::new(Arc::new(FailingBackend));
        let article = test_article(None);
        let variants = generator.generate_all(&article).await;
        assert_eq!(variants.len(), 4);
        for (slug, text) in &variants {
            assert!(!text.trim().is_empty(), "variant {slug} was empty");
        }
    }

    #[test]
    fn test_prompts_include_article_fields() {
        let article = test_article(Some("AUC 0.93 on held-out data."));
        for key in VariantKey::all() {
            let (_, prompt, _) = build_prompt(&article, key.platform, key.length);
            assert!(prompt.contains(&article.title), "{} prompt lacks title", key.slug());
        }
        let (_, long_prompt, _) = build_prompt(&article, Platform::Professional, Length::Long);
        assert!(long_prompt.contains("31452104"));
        assert!(long_prompt.contains("Diabetic Retinopathy"));
    }
}
