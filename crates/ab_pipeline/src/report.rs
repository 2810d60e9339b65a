use ab_site::PublishReceipt;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Fetch,
    Select,
    Generate,
    Images,
    Assemble,
    Publish,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::Fetch => "fetch",
            Stage::Select => "select",
            Stage::Generate => "generate",
            Stage::Images => "images",
            Stage::Assemble => "assemble",
            Stage::Publish => "publish",
            Stage::Done => "done",
        })
    }
}

/// Where a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Done,
    /// Configuration or state problem found before any feed was read.
    Failed { stage: Stage, reason: String },
    /// Shutdown requested; the run stopped before `stage`.
    Aborted(Stage),
}

/// One article or feed dropped from the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub stage: Stage,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub fetched: usize,
    pub selected: usize,
    pub generated: usize,
    pub with_image: usize,
    pub assembled: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    /// Written posts, relative to the site repository.
    pub posts: Vec<PathBuf>,
    pub published: Option<PublishReceipt>,
    pub publish_error: Option<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Done,
            fetched: 0,
            selected: 0,
            generated: 0,
            with_image: 0,
            assembled: 0,
            skipped: 0,
            failures: Vec::new(),
            posts: Vec::new(),
            published: None,
            publish_error: None,
        }
    }

    /// A run that never got past setup.
    pub fn init_failure(reason: impl fmt::Display) -> Self {
        let mut report = Self::new();
        report.fail(Stage::Init, reason);
        report
    }

    pub(crate) fn fail(&mut self, stage: Stage, reason: impl fmt::Display) {
        self.status = RunStatus::Failed {
            stage,
            reason: reason.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn abort(&mut self, stage: Stage) {
        self.status = RunStatus::Aborted(stage);
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self) {
        self.status = RunStatus::Done;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn record_failure(&mut self, stage: Stage, url: impl Into<String>, error: impl fmt::Display) {
        self.failures.push(ItemFailure {
            stage,
            url: url.into(),
            error: error.to_string(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn failures_at(&self, stage: Stage) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    /// Zero only for a completed run whose publish step did not fail.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Done if self.publish_error.is_none() => 0,
            _ => 1,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.status {
            RunStatus::Done => "done".to_string(),
            RunStatus::Failed { stage, reason } => format!("failed at {}: {}", stage, reason),
            RunStatus::Aborted(stage) => format!("aborted before {}", stage),
        };
        write!(
            f,
            "Run {} {}: fetched {}, selected {}, generated {}, with image {}, assembled {}, skipped {}, failed {}",
            &self.run_id.to_string()[..8],
            status,
            self.fetched,
            self.selected,
            self.generated,
            self.with_image,
            self.assembled,
            self.skipped,
            self.failed()
        )?;
        if let Some(receipt) = &self.published {
            match &receipt.commit {
                Some(commit) => write!(f, ", published {} to {}", &commit[..commit.len().min(8)], receipt.branch)?,
                None => write!(f, ", publish skipped (dry run)")?,
            }
        }
        if let Some(error) = &self.publish_error {
            write!(f, ", publish failed: {}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let mut report = RunReport::new();
        report.finish();
        assert_eq!(report.exit_code(), 0);

        report.publish_error = Some("push rejected".into());
        assert_eq!(report.exit_code(), 1);

        assert_eq!(RunReport::init_failure("GITHUB_TOKEN is required").exit_code(), 1);

        let mut aborted = RunReport::new();
        aborted.abort(Stage::Generate);
        assert_eq!(aborted.exit_code(), 1);
    }

    #[test]
    fn test_item_failures_do_not_fail_the_run() {
        let mut report = RunReport::new();
        report.record_failure(Stage::Fetch, "https://broken.example/feed", "Feed error: bad xml");
        report.record_failure(Stage::Generate, "https://example.com/a", "Generation error: empty");
        report.finish();
        assert_eq!(report.failed(), 2);
        assert_eq!(report.failures_at(Stage::Fetch).count(), 1);
        assert_eq!(report.exit_code(), 0);

        let summary = report.to_string();
        assert!(summary.contains("done"));
        assert!(summary.contains("failed 2"));
    }
}
