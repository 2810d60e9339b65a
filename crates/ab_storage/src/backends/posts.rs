use ab_core::{canonical_url, parse_front_matter, LedgerEntry, PublishedIndex, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Derives the published set from the `source_url` of every post already in
/// the site repository. The post file itself is the record, so `record`
/// only logs.
#[derive(Debug, Clone)]
pub struct PostScanLedger {
    posts_dir: PathBuf,
}

impl PostScanLedger {
    pub fn new(posts_dir: impl AsRef<Path>) -> Self {
        Self {
            posts_dir: posts_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl PublishedIndex for PostScanLedger {
    async fn published_urls(&self) -> Result<HashSet<String>> {
        let mut urls = HashSet::new();
        let mut dir = match fs::read_dir(&self.posts_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(urls),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !matches!(path.extension().and_then(|e| e.to_str()), Some("md" | "markdown")) {
                continue;
            }
            let text = fs::read_to_string(&path).await?;
            match parse_front_matter(&text) {
                Ok((front_matter, _)) => {
                    if let Some(url) = front_matter.source_url.filter(|u| !u.trim().is_empty()) {
                        urls.insert(canonical_url(&url));
                    }
                }
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(urls)
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        debug!("Post {} records {}", entry.post_path, entry.url);
        Ok(())
    }
}
