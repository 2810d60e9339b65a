pub mod config;
pub mod error;
pub mod front_matter;
pub mod http;
pub mod models;
pub mod storage;
pub mod types;

pub use config::{
    EnvSettings, HttpConfig, InferenceConfig, LedgerConfig, LedgerKind, ProviderKind, RepoConfig, RunConfig,
    Settings, SiteConfig,
};
pub use error::{Error, PublishFailure, Result};
pub use front_matter::{parse_front_matter, render_front_matter, FrontMatter};
pub use http::{with_retry, HttpClient, HttpFetch, HttpResponse, RetryPolicy};
pub use models::{ContentGenerator, GenerationParams};
pub use storage::{LedgerEntry, PublishedIndex};
pub use types::{canonical_url, ArticleRecord, GeneratedPost, ImageAsset};
