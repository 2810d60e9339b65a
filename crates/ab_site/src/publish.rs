use ab_core::{with_retry, Error, PublishFailure, RepoConfig, Result, RetryPolicy, SiteConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    /// Commit hash, `None` when nothing was actually committed (dry run).
    pub commit: Option<String>,
    pub branch: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Commits everything under the site repository and pushes it.
    async fn publish(&self, message: &str) -> Result<PublishReceipt>;
}

/// `Add <n> new blog post(s) - <YYYY-MM-DD>`
pub fn commit_message(count: usize, date: DateTime<Utc>) -> String {
    format!(
        "Add {} new blog post{} - {}",
        count,
        if count == 1 { "" } else { "s" },
        date.format("%Y-%m-%d")
    )
}

/// Maps git's stderr to a failure class. Matching is on lowercase text and
/// the first hit wins.
pub fn classify_git_error(stderr: &str) -> PublishFailure {
    let text = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if any(&[
        "authentication failed",
        "could not read username",
        "could not read password",
        "invalid username or password",
        "permission denied",
        "error: 401",
        "error: 403",
        "returned error: 403",
    ]) {
        PublishFailure::Auth
    } else if any(&["[rejected]", "non-fast-forward", "fetch first", "protected branch", "[remote rejected]"]) {
        PublishFailure::Rejected
    } else if any(&[
        "could not resolve host",
        "connection timed out",
        "connection refused",
        "connection reset",
        "network is unreachable",
        "operation timed out",
        "unable to access",
        "early eof",
        "the remote end hung up",
    ]) {
        PublishFailure::Network
    } else {
        PublishFailure::Git
    }
}

/// Publishes by shelling out to `git` in the site repository.
pub struct GitPublisher {
    repo: RepoConfig,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GitPublisher {
    pub fn new(repo: RepoConfig) -> Self {
        Self {
            repo,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn git(&self, cwd: &Path, label: &str, args: &[&str]) -> Result<String> {
        debug!("git {} in {}", label, cwd.display());
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(output) => output.map_err(|e| Error::publish(PublishFailure::Git, format!("failed to start git: {}", e)))?,
            Err(_) => {
                return Err(Error::publish(
                    PublishFailure::Network,
                    format!("git {} timed out after {:?}", label, self.timeout),
                ))
            }
        };

        if !output.status.success() {
            let stderr = self.repo.redact(String::from_utf8_lossy(&output.stderr).trim());
            let stdout = self.repo.redact(String::from_utf8_lossy(&output.stdout).trim());
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(Error::publish(
                classify_git_error(&detail),
                format!("git {} failed: {}", label, detail),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Where pushes go: the credentialed URL when a token is configured,
    /// otherwise the named remote with whatever auth git already has.
    fn push_target(&self) -> String {
        if self.repo.token.is_empty() {
            self.repo.remote.clone()
        } else {
            self.repo.authenticated_url()
        }
    }

    /// Pushes `HEAD` to the configured branch. Network failures are retried.
    pub async fn push(&self) -> Result<()> {
        let target = self.push_target();
        let refspec = format!("HEAD:{}", self.repo.branch);
        let args = ["push", target.as_str(), refspec.as_str()];

        info!("📤 Pushing to {} ({})", self.repo.public_url(), self.repo.branch);
        with_retry(&self.retry, "git push", || self.git(&self.repo.path, "push", &args)).await?;
        info!("✨ Pushed {}", self.repo.branch);
        Ok(())
    }

    /// Prepares the site repository: clones it when the path is missing,
    /// initialises it when the path exists without `.git`, then configures
    /// the commit identity and creates the post and image directories.
    pub async fn setup(&self, site: &SiteConfig) -> Result<()> {
        let path = &self.repo.path;

        if !tokio::fs::try_exists(path).await? {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            tokio::fs::create_dir_all(parent).await?;

            let source = if self.repo.token.is_empty() {
                self.repo.public_url()
            } else {
                self.repo.authenticated_url()
            };
            let dest = path.to_string_lossy().into_owned();
            let args = ["clone", source.as_str(), dest.as_str()];
            info!("📥 Cloning {} into {}", self.repo.public_url(), path.display());
            with_retry(&self.retry, "git clone", || self.git(parent, "clone", &args)).await?;

            // Keep the token out of .git/config.
            self.git(path, "remote", &["remote", "set-url", &self.repo.remote, &self.repo.public_url()])
                .await?;
            if self.git(path, "checkout", &["checkout", &self.repo.branch]).await.is_err() {
                self.git(path, "checkout", &["checkout", "-b", &self.repo.branch]).await?;
            }
        } else if !tokio::fs::try_exists(path.join(".git")).await? {
            info!("Initialising git repository in {}", path.display());
            self.git(path, "init", &["init"]).await?;
            self.git(path, "remote", &["remote", "add", &self.repo.remote, &self.repo.public_url()])
                .await?;
            let head = format!("refs/heads/{}", self.repo.branch);
            self.git(path, "symbolic-ref", &["symbolic-ref", "HEAD", &head]).await?;
        } else {
            debug!("{} is already a git repository", path.display());
        }

        self.git(path, "config", &["config", "user.name", &self.repo.username]).await?;
        self.git(path, "config", &["config", "user.email", &self.repo.email]).await?;

        tokio::fs::create_dir_all(site.posts_path()).await?;
        tokio::fs::create_dir_all(site.images_path()).await?;
        info!("✨ Repository ready at {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, message: &str) -> Result<PublishReceipt> {
        let path = &self.repo.path;
        self.git(path, "add", &["add", "--all"]).await?;

        let status = self.git(path, "status", &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Err(Error::publish(PublishFailure::NothingToCommit, "working tree is clean"));
        }

        let name = format!("user.name={}", self.repo.username);
        let email = format!("user.email={}", self.repo.email);
        self.git(path, "commit", &["-c", &name, "-c", &email, "commit", "-m", message])
            .await?;
        let commit = self.git(path, "rev-parse", &["rev-parse", "HEAD"]).await?.trim().to_string();
        info!("📝 Committed {}: {}", &commit[..commit.len().min(8)], message);

        if let Err(e) = self.push().await {
            warn!("❌ Push failed, commit {} stays local: {}", commit, e);
            return Err(e);
        }

        Ok(PublishReceipt {
            commit: Some(commit),
            branch: self.repo.branch.clone(),
        })
    }
}

/// Stands in for git on dry runs.
pub struct NoopPublisher {
    branch: String,
}

impl NoopPublisher {
    pub fn new(branch: impl Into<String>) -> Self {
        Self { branch: branch.into() }
    }
}

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, message: &str) -> Result<PublishReceipt> {
        info!("Dry run, not publishing: {}", message);
        Ok(PublishReceipt {
            commit: None,
            branch: self.branch.clone(),
        })
    }
}
