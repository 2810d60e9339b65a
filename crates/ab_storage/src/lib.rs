use ab_core::{LedgerKind, PublishedIndex, Result};
use std::path::Path;
use std::sync::Arc;

pub mod backends;

pub use backends::*;

/// Opens the ledger backend named in the configuration.
pub async fn create_ledger(kind: &LedgerKind, path: &Path, posts_dir: &Path) -> Result<Arc<dyn PublishedIndex>> {
    let ledger: Arc<dyn PublishedIndex> = match kind {
        LedgerKind::Memory => Arc::new(MemoryLedger::new()),
        LedgerKind::File => Arc::new(FileLedger::new(path)),
        LedgerKind::Posts => Arc::new(PostScanLedger::new(posts_dir)),
        #[cfg(feature = "sqlite")]
        LedgerKind::Sqlite => Arc::new(SqliteLedger::new_with_path(path).await?),
        #[cfg(not(feature = "sqlite"))]
        LedgerKind::Sqlite => {
            return Err(ab_core::Error::Config(
                "LEDGER_BACKEND=sqlite needs a build with the 'sqlite' feature".to_string(),
            ))
        }
    };
    tracing::debug!("Using {:?} ledger", kind);
    Ok(ledger)
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::create_ledger;
    pub use ab_core::{LedgerEntry, PublishedIndex};
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::{Error, LedgerEntry};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_ledger_kinds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let posts = dir.path().join("_posts");

        for kind in [LedgerKind::Memory, LedgerKind::File, LedgerKind::Posts] {
            let ledger = create_ledger(&kind, &path, &posts).await.unwrap();
            assert!(ledger.published_urls().await.unwrap().is_empty());
        }

        let file = create_ledger(&LedgerKind::File, &path, &posts).await.unwrap();
        file.record(&LedgerEntry::new("https://example.com/a", "_posts/a.md")).await.unwrap();
        assert!(file.contains("https://example.com/a").await.unwrap());
    }

    #[cfg(not(feature = "sqlite"))]
    #[tokio::test]
    async fn test_sqlite_requires_feature() {
        let dir = tempdir().unwrap();
        let result = create_ledger(&LedgerKind::Sqlite, &dir.path().join("l.db"), dir.path()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
