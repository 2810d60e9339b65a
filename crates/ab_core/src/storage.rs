use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use crate::Result;

/// One published article: its canonical URL and the post written for it,
/// relative to the site repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub url: String,
    pub post_path: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(url: impl Into<String>, post_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            post_path: post_path.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only set of article URLs that already produced a post.
#[async_trait]
pub trait PublishedIndex: Send + Sync {
    /// Every recorded URL, loaded once per run before selection
    async fn published_urls(&self) -> Result<HashSet<String>>;

    async fn contains(&self, url: &str) -> Result<bool> {
        Ok(self.published_urls().await?.contains(url))
    }

    /// Must be durable when it returns
    async fn record(&self, entry: &LedgerEntry) -> Result<()>;
}
