use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a publish attempt did not reach the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailure {
    Auth,
    Network,
    /// The remote refused the update (non-fast-forward, protected branch).
    Rejected,
    NothingToCommit,
    Git,
}

impl fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishFailure::Auth => "authentication failed",
            PublishFailure::Network => "network failure",
            PublishFailure::Rejected => "push rejected",
            PublishFailure::NothingToCommit => "nothing to commit",
            PublishFailure::Git => "git error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Post already exists: {}", .0.display())]
    Collision(PathBuf),

    #[error("Publish error ({kind}): {message}")]
    Publish { kind: PublishFailure, message: String },

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Front-matter error: {0}")]
    FrontMatter(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn publish(kind: PublishFailure, message: impl Into<String>) -> Self {
        Error::Publish {
            kind,
            message: message.into(),
        }
    }

    /// Failures worth another attempt: timeouts, dropped connections, 408/429
    /// and server errors. Auth and validation failures are final.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error())
            }
            Error::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Error::Timeout(_) => true,
            Error::Publish { kind, .. } => *kind == PublishFailure::Network,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
