use ab_core::{Error, LedgerEntry, PublishedIndex, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

/// Append-only JSON-lines ledger. Each `record` is flushed to disk before
/// it returns; a line torn by a crash at the end of the file is ignored on
/// the next read.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut entries = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<LedgerEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if i + 1 == lines.len() => {
                    warn!("⚠️ Ignoring torn last line of {}: {}", self.path.display(), e);
                }
                Err(e) => {
                    return Err(Error::Ledger(format!(
                        "{} line {} is corrupt: {}",
                        self.path.display(),
                        i + 1,
                        e
                    )))
                }
            }
        }
        Ok(entries)
    }

    /// Drops a partial line left at the end of the file by an interrupted
    /// write, so the next append starts on a fresh line.
    async fn repair_tail(&self) -> Result<()> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            return Ok(());
        }

        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        if serde_json::from_slice::<LedgerEntry>(&bytes[keep..]).is_ok() {
            file.seek(SeekFrom::End(0)).await?;
            file.write_all(b"\n").await?;
        } else {
            warn!("⚠️ Dropping torn last line of {}", self.path.display());
            file.set_len(keep as u64).await?;
        }
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl PublishedIndex for FileLedger {
    async fn published_urls(&self) -> Result<HashSet<String>> {
        Ok(self.entries().await?.into_iter().map(|e| e.url).collect())
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        self.repair_tail().await?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}
