use ab_core::{
    ArticleRecord, ContentGenerator, Error, GeneratedPost, GenerationParams, HttpClient, HttpFetch, LedgerEntry,
    PublishFailure, PublishedIndex, Result, RetryPolicy, RunConfig,
};
use ab_feeds::{select_articles, FeedReader};
use ab_inference::create_generator;
use ab_site::{commit_message, AssemblyOutcome, GitPublisher, ImageAcquirer, NoopPublisher, PostAssembler, Publisher};
use ab_storage::create_ledger;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::logging::Logger;
use crate::report::{RunReport, Stage};

/// The collaborators a run talks to. Everything else is derived from the
/// configuration.
pub struct Components {
    pub http: Arc<dyn HttpFetch>,
    pub generator: Arc<dyn ContentGenerator>,
    pub ledger: Arc<dyn PublishedIndex>,
    pub publisher: Arc<dyn Publisher>,
}

pub struct Orchestrator {
    config: Arc<RunConfig>,
    reader: FeedReader,
    generator: Arc<dyn ContentGenerator>,
    ledger: Arc<dyn PublishedIndex>,
    acquirer: ImageAcquirer,
    assembler: PostAssembler,
    publisher: Arc<dyn Publisher>,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: RunConfig, components: Components) -> Self {
        let retry = RetryPolicy::from(&config.http);
        let reader = FeedReader::new(components.http.clone(), retry, config.concurrency)
            .with_full_article(config.fetch_full_article);
        let acquirer = ImageAcquirer::new(
            components.http,
            retry,
            config.site.images_path(),
            config.site.image_max_width,
        );
        let assembler = PostAssembler::new(config.site.clone());

        Self {
            config: Arc::new(config),
            reader,
            generator: components.generator,
            ledger: components.ledger,
            acquirer,
            assembler,
            publisher: components.publisher,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds the production components. A dry run writes into a scratch
    /// directory with the dummy provider, an in-memory ledger and a
    /// publisher that never touches git, so the site checkout is left alone.
    pub async fn from_config(config: RunConfig, dry_run: bool) -> Result<Self> {
        let config = if dry_run {
            let scratch = std::env::temp_dir().join(format!("autoblog-dry-run-{}", uuid::Uuid::new_v4().simple()));
            tokio::fs::create_dir_all(&scratch).await?;
            tracing::info!("📝 Dry run output goes to {}", scratch.display());
            config.into_dry_run(scratch)
        } else {
            if !config.repo.path.is_dir() {
                return Err(Error::Config(format!(
                    "site repository {} does not exist, run `autoblog setup` first",
                    config.repo.path.display()
                )));
            }
            config
        };

        let http: Arc<dyn HttpFetch> = Arc::new(HttpClient::new(&config.http)?);
        let generator = create_generator(&config.inference, &config.http)?;
        tracing::info!("🧠 Content generator ready (using {})", generator.name());

        let ledger = create_ledger(&config.ledger.kind, &config.ledger.path, &config.site.posts_path()).await?;
        let publisher: Arc<dyn Publisher> = if dry_run {
            Arc::new(NoopPublisher::new(config.repo.branch.clone()))
        } else {
            Arc::new(GitPublisher::new(config.repo.clone()).with_retry(RetryPolicy::from(&config.http)))
        };

        Ok(Self::new(
            config,
            Components {
                http,
                generator: Arc::new(generator),
                ledger,
                publisher,
            },
        ))
    }

    /// Shared flag; once set the run stops at the next stage boundary.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new();
        let logger = Logger::new().with_prefix(format!("[run {}]", &report.run_id.to_string()[..8]));
        logger.info(&format!("🚀 Starting run over {} feeds", self.config.feeds.len()));

        self.execute(&mut report, &logger).await;

        match report.status {
            crate::report::RunStatus::Done => logger.info(&format!("🏁 {}", report)),
            _ => logger.warn(&format!("🏁 {}", report)),
        }
        report
    }

    async fn execute(&self, report: &mut RunReport, logger: &Logger) {
        // The ledger must be readable before anything can be selected.
        let published = match self.ledger.published_urls().await {
            Ok(urls) => urls,
            Err(e) => {
                logger.error(&format!("❌ Cannot read the published ledger: {}", e));
                report.fail(Stage::Init, e);
                return;
            }
        };
        logger.debug(&format!("{} articles already published", published.len()));

        if self.stopping(report, Stage::Fetch, logger) {
            return;
        }
        let batch = self
            .reader
            .read_all(&self.config.feeds, self.config.max_items_per_feed)
            .await;
        report.fetched = batch.articles.len();
        for failure in batch.failures {
            report.record_failure(Stage::Fetch, failure.feed_url, failure.error);
        }

        if self.stopping(report, Stage::Select, logger) {
            return;
        }
        let now = Utc::now();
        let selection = select_articles(
            batch.articles,
            &published,
            now,
            self.config.max_article_age_days,
            self.config.posts_per_day,
        );
        for skipped in &selection.skipped {
            logger.info(&format!("⏭️ Skipping {}: {}", skipped.article.url, skipped.reason));
        }
        report.skipped += selection.skipped.len();
        report.selected = selection.selected.len();
        logger.info(&format!("📋 Selected {} of {} articles", report.selected, report.fetched));

        let articles = join_all(
            selection
                .selected
                .into_iter()
                .map(|article| self.reader.complete_content(article)),
        )
        .await;

        if self.stopping(report, Stage::Generate, logger) {
            return;
        }
        let posts = self.generate(&articles, report, logger).await;
        report.generated = posts.len();

        if self.stopping(report, Stage::Images, logger) {
            return;
        }
        let posts = self.attach_images(posts, logger).await;
        report.with_image = posts.iter().filter(|p| p.image.is_some()).count();

        if self.stopping(report, Stage::Assemble, logger) {
            return;
        }
        self.assemble(&posts, now, report, logger).await;

        if report.assembled == 0 {
            logger.info("No new posts, skipping publish");
            report.finish();
            return;
        }

        if self.stopping(report, Stage::Publish, logger) {
            return;
        }
        self.publish(now, report, logger).await;
        report.finish();
    }

    fn stopping(&self, report: &mut RunReport, next: Stage, logger: &Logger) -> bool {
        if self.shutdown.load(Ordering::SeqCst) {
            logger.warn(&format!("🛑 Shutdown requested, stopping before {}", next));
            report.abort(next);
            true
        } else {
            false
        }
    }

    async fn generate(&self, articles: &[ArticleRecord], report: &mut RunReport, logger: &Logger) -> Vec<GeneratedPost> {
        let params = GenerationParams {
            max_words: self.config.max_words_per_post,
            style: self.config.style.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let total = articles.len();

        let tasks = articles.iter().enumerate().map(|(i, article)| {
            let semaphore = semaphore.clone();
            let logger = logger.with_prefix(format!("[{}/{}]", i + 1, total));
            let params = &params;
            async move {
                let _permit = semaphore.acquire().await.map_err(|e| Error::External(e.into()))?;
                logger.info(&format!("🤖 Generating post for: {}", article.title));
                let post = self.generator.generate(article, params).await?;
                if post.degraded {
                    logger.warn(&format!("⚠️ Recovered \"{}\" from an unstructured answer", post.title));
                } else {
                    logger.info(&format!("✨ Generated \"{}\"", post.title));
                }
                Ok::<_, Error>(post)
            }
        });

        let mut posts = Vec::new();
        for (article, result) in articles.iter().zip(join_all(tasks).await) {
            match result {
                Ok(post) => posts.push(post),
                Err(e) => {
                    logger.warn(&format!("❌ Dropping {}: {}", article.url, e));
                    report.record_failure(Stage::Generate, article.url.clone(), e);
                }
            }
        }
        posts
    }

    /// Image failures never drop a post, only its image.
    async fn attach_images(&self, posts: Vec<GeneratedPost>, logger: &Logger) -> Vec<GeneratedPost> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let total = posts.len();

        let tasks = posts.into_iter().enumerate().map(|(i, post)| {
            let semaphore = semaphore.clone();
            let logger = logger.with_prefix(format!("[{}/{}]", i + 1, total));
            async move {
                if post.article.image_urls.is_empty() {
                    logger.debug("No image candidates");
                    return post;
                }
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return post,
                };
                let article = &post.article;
                let acquired = self
                    .acquirer
                    .acquire(&article.image_urls, &article.title, article.published_at)
                    .await;
                match acquired {
                    Ok(image) => {
                        logger.info(&format!("🖼️ Image ready: {}", image.file_name));
                        post.with_image(image)
                    }
                    Err(e) => {
                        logger.warn(&format!("⚠️ Publishing without an image: {}", e));
                        post
                    }
                }
            }
        });

        join_all(tasks).await
    }

    /// Sequential so that slug collisions resolve the same way every time.
    async fn assemble(&self, posts: &[GeneratedPost], date: DateTime<Utc>, report: &mut RunReport, logger: &Logger) {
        for post in posts {
            let url = &post.article.url;
            match self.assembler.assemble(post, date).await {
                Ok(AssemblyOutcome::Written { relative_path, .. }) => {
                    report.assembled += 1;
                    report.posts.push(relative_path.clone());
                    self.remember(url, &relative_path, report, logger).await;
                }
                Ok(AssemblyOutcome::Skipped { path }) => {
                    logger.info(&format!("⏭️ {} already has a post at {}", url, path.display()));
                    report.skipped += 1;
                    let relative = path
                        .strip_prefix(&self.config.site.repo_path)
                        .unwrap_or(&path)
                        .to_path_buf();
                    self.remember(url, &relative, report, logger).await;
                }
                Err(e) => {
                    logger.warn(&format!("❌ Could not write post for {}: {}", url, e));
                    report.record_failure(Stage::Assemble, url.clone(), e);
                }
            }
        }
    }

    async fn remember(&self, url: &str, post_path: &Path, report: &mut RunReport, logger: &Logger) {
        let entry = LedgerEntry::new(url, post_path.to_string_lossy().replace('\\', "/"));
        if let Err(e) = self.ledger.record(&entry).await {
            logger.error(&format!("❌ Could not record {} in the ledger: {}", url, e));
            report.record_failure(Stage::Assemble, url, e);
        }
    }

    async fn publish(&self, date: DateTime<Utc>, report: &mut RunReport, logger: &Logger) {
        let message = commit_message(report.assembled, date);
        logger.info(&format!("📤 Publishing: {}", message));
        match self.publisher.publish(&message).await {
            Ok(receipt) => report.published = Some(receipt),
            Err(Error::Publish {
                kind: PublishFailure::NothingToCommit,
                ..
            }) => logger.info("Nothing to commit"),
            Err(e) => {
                logger.error(&format!("❌ Publish failed, posts stay on disk: {}", e));
                report.publish_error = Some(e.to_string());
            }
        }
    }
}
