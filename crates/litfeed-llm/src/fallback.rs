//! Deterministic fallback copy, used when a model call fails.
//!
//! Pure functions of Article fields only — no network, no clock, no state —
//! so report assembly always has something to write for every slot.

use litfeed_common::{Article, Length, Platform};

/// Render the fallback variant for one (platform, length) combination.
/// Never empty, even for articles with no abstract or keywords.
pub fn render(article: &Article, platform: Platform, length: Length) -> String {
    match (platform, length) {
        (Platform::Casual, Length::Long)        => casual_long(article),
        (Platform::Casual, Length::Short)       => casual_short(article),
        (Platform::Professional, Length::Long)  => professional_long(article),
        (Platform::Professional, Length::Short) => professional_short(article),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

fn first_keyword(article: &Article) -> &str {
    article
        .keywords
        .first()
        .map(String::as_str)
        .unwrap_or("medical research")
}

fn casual_long(article: &Article) -> String {
    format!(
        "🔥 {title}\n\n\
         Just spotted a new study in {journal} worth a closer look!\n\n\
         💡 Why it caught my eye:\n\
         • Fresh results on {keyword}\n\
         • Peer-reviewed and hot off the press\n\
         • Could shape where this field goes next\n\n\
         ⚠️ As always: early-stage research, so keep expectations measured.\n\n\
         📖 Full paper: {url}\n\n\
         #MedicalResearch #ScienceNews",
        title = truncate(&article.title, 60),
        journal = non_empty(&article.journal, "a peer-reviewed journal"),
        keyword = first_keyword(article),
        url = article.url(),
    )
}

fn casual_short(article: &Article) -> String {
    format!(
        "📢 {title}\n\n\
         {journal} · new findings on {keyword}\n\n\
         Full paper → {url}",
        title = truncate(&article.title, 45),
        journal = non_empty(&article.journal, "New study"),
        keyword = first_keyword(article),
        url = article.url(),
    )
}

fn professional_long(article: &Article) -> String {
    let authors = if article.authors.is_empty() {
        "N/A".to_string()
    } else {
        article.authors.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
    };
    let summary = article
        .abstract_text
        .as_deref()
        .map(|a| truncate(a, 600))
        .unwrap_or_else(|| "No abstract is available for this record; see the original article for details.".to_string());
    format!(
        "Title: {title}\n\n\
         [Background]\n\
         This article, published in {journal}, reports new findings relevant to clinical practice and research.\n\n\
         [Summary]\n\
         {summary}\n\n\
         [Significance]\n\
         Readers should consult the full text for complete methods and statistical detail before drawing conclusions.\n\n\
         ---\n\
         Authors: {authors}\n\
         Journal: {journal}\n\
         Published: {pub_date}\n\
         PMID: {pmid}\n\
         DOI: {doi}\n\
         Source: {url}",
        title = article.title,
        journal = non_empty(&article.journal, "N/A"),
        summary = summary,
        authors = authors,
        pub_date = non_empty(&article.pub_date, "N/A"),
        pmid = article.pmid,
        doi = article.doi.as_deref().unwrap_or("N/A"),
        url = article.url(),
    )
}

fn professional_short(article: &Article) -> String {
    let summary = article
        .abstract_text
        .as_deref()
        .map(|a| truncate(a, 250))
        .unwrap_or_else(|| "Abstract not available; see the original record.".to_string());
    format!(
        "Title: {title}\n\n\
         [Overview]\n\
         {journal} reports: {summary}\n\n\
         [Takeaway]\n\
         Findings are preliminary until independently validated; full statistics in the source.\n\n\
         ---\n\
         Source: {url}",
        title = article.title,
        journal = non_empty(&article.journal, "A recent study"),
        summary = summary,
        url = article.url(),
    )
}

fn non_empty<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use litfeed_common::VariantKey;

    fn article_without_abstract() -> Article {
        Article {
            pmid: "99887766".to_string(),
            title: "Large language models for triage in emergency medicine".to_string(),
            abstract_text: None,
            authors: vec![],
            journal: String::new(),
            pub_date: String::new(),
            doi: None,
            keywords: vec![],
            mesh_terms: vec![],
            fetched_at: Utc::now(),
            quality_score: None,
        }
    }

    #[test]
    fn test_all_variants_nonempty_without_abstract() {
        let article = article_without_abstract();
        for key in VariantKey::all() {
            let text = render(&article, key.platform, key.length);
            assert!(!text.trim().is_empty(), "{} was empty", key.slug());
        }
    }

    #[test]
    fn test_fallback_mentions_identifier_or_title() {
        let article = article_without_abstract();
        let long = render(&article, Platform::Professional, Length::Long);
        assert!(long.contains(&article.pmid));
        let casual = render(&article, Platform::Casual, Length::Short);
        assert!(casual.contains(&article.url()));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let article = article_without_abstract();
        let a = render(&article, Platform::Casual, Length::Long);
        let b = render(&article, Platform::Casual, Length::Long);
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "αβγδε".repeat(100);
        let t = truncate(&s, 10);
        assert!(t.chars().count() <= 11); // 10 chars + ellipsis
    }
}
