use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// One feed entry, normalised. `url` is the canonical link and the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub feed_url: String,
    pub feed_position: usize,
    pub entry_position: usize,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    pub image_urls: Vec<String>,
    pub source: String,
    pub categories: Vec<String>,
    pub author: Option<String>,
}

impl ArticleRecord {
    /// Text handed to the provider: the content, or the summary when the
    /// feed only carried a teaser.
    pub fn body_text(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.summary
        } else {
            &self.content
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub source_url: String,
    pub path: PathBuf,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub article: ArticleRecord,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub meta_description: String,
    pub image: Option<ImageAsset>,
    /// Set when the provider answer was not valid JSON and the fields were
    /// pulled out heuristically.
    pub degraded: bool,
    pub provider: String,
}

impl GeneratedPost {
    pub fn with_image(mut self, image: ImageAsset) -> Self {
        self.image = Some(image);
        self
    }
}

const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Normalises an article link so the same story reached through different
/// tracking links maps to one ledger key.
pub fn canonical_url(link: &str) -> String {
    let trimmed = link.trim();
    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_url_strips_tracking() {
        assert_eq!(
            canonical_url("HTTPS://Example.com/news/story/?utm_source=rss&id=7#comments"),
            "https://example.com/news/story?id=7"
        );
        assert_eq!(
            canonical_url("https://example.com/a?utm_medium=x&fbclid=abc"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_canonical_url_keeps_root_and_garbage() {
        assert_eq!(canonical_url("https://example.com/"), "https://example.com/");
        assert_eq!(canonical_url("  not a url "), "not a url");
    }

    #[test]
    fn test_body_text_falls_back_to_summary() {
        let article = ArticleRecord {
            feed_url: "https://example.com/feed".into(),
            feed_position: 0,
            entry_position: 0,
            url: "https://example.com/a".into(),
            title: "A".into(),
            summary: "teaser".into(),
            content: "  ".into(),
            published_at: Utc::now(),
            image_urls: vec![],
            source: "Example".into(),
            categories: vec![],
            author: None,
        };
        assert_eq!(article.body_text(), "teaser");
    }
}
