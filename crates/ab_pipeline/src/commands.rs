//! Entry points behind the `push` and `setup` commands. `run` goes through
//! `Orchestrator` directly.

use ab_core::{Error, PublishFailure, RepoConfig, Result, Settings, SiteConfig};
use ab_site::{GitPublisher, Publisher};
use chrono::Utc;
use tracing::info;

/// Commits anything left in the working tree and pushes. With nothing to
/// commit it still pushes, so commits stranded by an earlier failed push
/// go out.
pub async fn push(repo: RepoConfig) -> Result<()> {
    if !repo.path.is_dir() {
        return Err(Error::Config(format!(
            "site repository {} does not exist, run `autoblog setup` first",
            repo.path.display()
        )));
    }
    let publisher = GitPublisher::new(repo);
    let message = format!("Update blog posts - {}", Utc::now().format("%Y-%m-%d"));

    match publisher.publish(&message).await {
        Ok(receipt) => {
            info!("✨ Published {:?} to {}", receipt.commit, receipt.branch);
            Ok(())
        }
        Err(Error::Publish {
            kind: PublishFailure::NothingToCommit,
            ..
        }) => {
            info!("Nothing to commit, pushing existing commits");
            publisher.push().await
        }
        Err(e) => Err(e),
    }
}

/// Clones or initialises the site repository and creates its directories.
pub async fn setup(settings: &dyn Settings) -> Result<()> {
    let repo = RepoConfig::from_settings(settings)?;
    let site = SiteConfig::from_settings(settings)?;
    GitPublisher::new(repo).setup(&site).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_push_needs_repository() {
        let repo = RepoConfig {
            token: "t".into(),
            username: "u".into(),
            email: "u@example.com".into(),
            repo: "r".into(),
            branch: "main".into(),
            remote: "origin".into(),
            host: "github.com".into(),
            path: PathBuf::from("/nonexistent/autoblog/site"),
        };
        assert!(matches!(push(repo).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_setup_reports_missing_credentials() {
        let settings: HashMap<String, String> = HashMap::new();
        let err = setup(&settings).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("GITHUB_USERNAME"));
        assert!(message.contains("GITHUB_EMAIL"));
    }
}
