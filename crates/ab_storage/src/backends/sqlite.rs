use ab_core::{Error, LedgerEntry, PublishedIndex, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePool, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS published (
        url TEXT PRIMARY KEY,
        post_path TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    )
    "#,
];

pub struct SqliteLedger {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

impl SqliteLedger {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new().filename(db_path).create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::Ledger(format!("Failed to open {}: {}", db_path.display(), e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Ledger(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl PublishedIndex for SqliteLedger {
    async fn published_urls(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT url FROM published")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Ledger(format!("Failed to read ledger: {}", e)))?;
        Ok(rows.iter().map(|row| row.get::<String, _>("url")).collect())
    }

    async fn contains(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM published WHERE url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Ledger(format!("Failed to query ledger: {}", e)))?;
        Ok(row.is_some())
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO published (url, post_path, recorded_at) VALUES (?, ?, ?)")
            .bind(&entry.url)
            .bind(&entry.post_path)
            .bind(entry.recorded_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Ledger(format!("Failed to record {}: {}", entry.url, e)))?;
        Ok(())
    }
}
