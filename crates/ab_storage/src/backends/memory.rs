use ab_core::{LedgerEntry, PublishedIndex, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Process-local ledger. Forgets everything on exit; meant for dry runs
/// and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = urls.into_iter().map(|url| LedgerEntry::new(url, "")).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl PublishedIndex for MemoryLedger {
    async fn published_urls(&self) -> Result<HashSet<String>> {
        Ok(self.entries.read().await.iter().map(|e| e.url.clone()).collect())
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if !entries.iter().any(|e| e.url == entry.url) {
            entries.push(entry.clone());
        }
        Ok(())
    }
}
