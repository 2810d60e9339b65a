use ab_core::{with_retry, ArticleRecord, Error, HttpFetch, Result, RetryPolicy, canonical_url};
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::html::{extract_image_urls, extract_page, html_to_text};

/// Feed content shorter than this triggers a fetch of the article page.
const MIN_CONTENT_CHARS: usize = 200;

#[derive(Debug)]
pub struct FeedFailure {
    pub feed_url: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct FeedBatch {
    pub articles: Vec<ArticleRecord>,
    pub failures: Vec<FeedFailure>,
}

pub struct FeedReader {
    http: Arc<dyn HttpFetch>,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    fetch_full_article: bool,
}

impl FeedReader {
    pub fn new(http: Arc<dyn HttpFetch>, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            http,
            retry,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            fetch_full_article: true,
        }
    }

    pub fn with_full_article(mut self, enabled: bool) -> Self {
        self.fetch_full_article = enabled;
        self
    }

    /// Fetches and parses one feed, newest entries first.
    pub async fn read_feed(&self, feed_url: &str, feed_position: usize, max_items: usize) -> Result<Vec<ArticleRecord>> {
        info!("📡 Fetching feed: {}", feed_url);
        let response = with_retry(&self.retry, feed_url, || self.http.get(feed_url))
            .await
            .map_err(|e| Error::Feed(format!("{}: {}", feed_url, e)))?;
        let articles = parse_feed(&response.body, feed_url, feed_position, max_items, Utc::now())?;
        info!("✨ {} items from {}", articles.len(), feed_url);
        Ok(articles)
    }

    /// Reads every feed concurrently. A failing feed lands in
    /// `FeedBatch::failures` and never stops the others.
    pub async fn read_all(&self, feeds: &[String], max_items: usize) -> FeedBatch {
        let reads = feeds.iter().enumerate().map(|(position, feed_url)| {
            let semaphore = self.semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.map_err(|e| Error::External(e.into()))?;
                self.read_feed(feed_url, position, max_items).await
            }
        });

        let mut batch = FeedBatch::default();
        for (feed_url, result) in feeds.iter().zip(join_all(reads).await) {
            match result {
                Ok(mut articles) => batch.articles.append(&mut articles),
                Err(error) => {
                    warn!("❌ Feed {} failed: {}", feed_url, error);
                    batch.failures.push(FeedFailure {
                        feed_url: feed_url.clone(),
                        error,
                    });
                }
            }
        }
        batch
    }

    /// When the feed only carried a teaser, fetches the article page for its
    /// main text and cover image. Failures keep the feed text.
    pub async fn complete_content(&self, mut article: ArticleRecord) -> ArticleRecord {
        if !self.fetch_full_article || article.content.chars().count() >= MIN_CONTENT_CHARS {
            return article;
        }
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return article,
        };

        debug!("📄 Fetching full article: {}", article.url);
        let response = match with_retry(&self.retry, &article.url, || self.http.get(&article.url)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ Could not fetch full article {}: {}", article.url, e);
                return article;
            }
        };

        let page = extract_page(&response.text(), &article.url);
        if let Some(text) = page.text {
            if text.chars().count() > article.content.chars().count() {
                article.content = text;
            }
        }
        if let Some(image) = page.image {
            if !article.image_urls.contains(&image) {
                article.image_urls.push(image);
            }
        }
        article
    }
}

/// Parses raw feed bytes (RSS or Atom). Entries without a link are dropped;
/// the rest are returned newest first, at most `max_items`.
pub fn parse_feed(
    bytes: &[u8],
    feed_url: &str,
    feed_position: usize,
    max_items: usize,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<ArticleRecord>> {
    let feed = parser::parse(bytes).map_err(|e| Error::Feed(format!("Failed to parse {}: {}", feed_url, e)))?;

    let source = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| Url::parse(feed_url).ok().and_then(|u| u.host_str().map(str::to_string)))
        .unwrap_or_else(|| feed_url.to_string());

    let mut articles: Vec<ArticleRecord> = feed
        .entries
        .into_iter()
        .enumerate()
        .filter_map(|(entry_position, entry)| {
            convert_entry(entry, feed_url, feed_position, entry_position, &source, fetched_at)
        })
        .collect();

    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles.truncate(max_items);
    Ok(articles)
}

fn convert_entry(
    entry: Entry,
    feed_url: &str,
    feed_position: usize,
    entry_position: usize,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Option<ArticleRecord> {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());
    let Some(link) = link else {
        debug!("Skipping entry {} of {}: no link", entry_position, feed_url);
        return None;
    };

    let raw_summary = entry.summary.as_ref().map(|s| s.content.clone()).unwrap_or_default();
    let raw_content = entry.content.as_ref().and_then(|c| c.body.clone()).unwrap_or_default();

    let mut image_urls = Vec::new();
    let mut push_image = |url: String| {
        if !image_urls.contains(&url) {
            image_urls.push(url);
        }
    };
    for media in &entry.media {
        for content in &media.content {
            let is_image = content
                .content_type
                .as_ref()
                .map_or(true, |mime| mime.essence_str().starts_with("image/"));
            if let (true, Some(url)) = (is_image, content.url.as_ref()) {
                push_image(url.to_string());
            }
        }
        for thumbnail in &media.thumbnails {
            push_image(thumbnail.image.uri.clone());
        }
    }
    for enclosure in entry.links.iter().filter(|l| l.rel.as_deref() == Some("enclosure")) {
        if enclosure.media_type.as_deref().map_or(false, |t| t.starts_with("image/")) {
            push_image(enclosure.href.clone());
        }
    }
    for html in [&raw_content, &raw_summary] {
        for url in extract_image_urls(html, Some(link.as_str())) {
            push_image(url);
        }
    }

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    Some(ArticleRecord {
        feed_url: feed_url.to_string(),
        feed_position,
        entry_position,
        url: canonical_url(&link),
        title,
        summary: html_to_text(&raw_summary),
        content: html_to_text(&raw_content),
        published_at: entry.published.or(entry.updated).unwrap_or(fetched_at),
        image_urls,
        source: source.to_string(),
        categories: entry
            .categories
            .into_iter()
            .map(|c| c.term.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        author: entry
            .authors
            .first()
            .map(|a| a.name.trim().to_string())
            .filter(|name| !name.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::HttpResponse;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::time::Duration;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com</link>
    <description>Tests</description>
    <item>
      <title>Older story</title>
      <link>https://news.example.com/older?utm_source=rss</link>
      <description>&lt;p&gt;Older teaser&lt;/p&gt;</description>
      <pubDate>Mon, 01 Jan 2024 08:00:00 GMT</pubDate>
      <category>Science</category>
    </item>
    <item>
      <title>Newer story</title>
      <link>https://news.example.com/newer</link>
      <description>&lt;p&gt;Teaser &lt;img src="/img/newer.png"&gt;&lt;/p&gt;</description>
      <pubDate>Tue, 02 Jan 2024 08:00:00 GMT</pubDate>
      <media:content url="https://cdn.example.com/newer.jpg" medium="image" type="image/jpeg"/>
    </item>
    <item>
      <title>No link here</title>
      <description>Orphan</description>
    </item>
  </channel>
</rss>"#;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
    }

    struct MockFetch {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl HttpFetch for MockFetch {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            match self.pages.get(url) {
                Some(body) => Ok(HttpResponse {
                    status: 200,
                    content_type: Some("application/xml".into()),
                    body: body.clone().into_bytes(),
                }),
                None => Err(Error::HttpStatus { status: 404, url: url.to_string() }),
            }
        }
    }

    fn reader(pages: &[(&str, &str)]) -> FeedReader {
        let fetch = MockFetch {
            pages: pages.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        FeedReader::new(Arc::new(fetch), RetryPolicy::new(1, Duration::ZERO), 2)
    }

    #[test]
    fn test_parse_feed_orders_and_normalises() {
        let articles = parse_feed(RSS.as_bytes(), "https://news.example.com/rss", 1, 10, fetched_at()).unwrap();
        assert_eq!(articles.len(), 2);

        let newer = &articles[0];
        assert_eq!(newer.title, "Newer story");
        assert_eq!(newer.source, "Example News");
        assert_eq!(newer.feed_position, 1);
        assert_eq!(newer.entry_position, 1);
        assert_eq!(newer.summary, "Teaser");
        assert_eq!(
            newer.image_urls,
            vec!["https://cdn.example.com/newer.jpg", "https://news.example.com/img/newer.png"]
        );

        let older = &articles[1];
        assert_eq!(older.url, "https://news.example.com/older");
        assert_eq!(older.categories, vec!["Science"]);
        assert_eq!(older.published_at, Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_feed_limits_items() {
        let articles = parse_feed(RSS.as_bytes(), "https://news.example.com/rss", 0, 1, fetched_at()).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Newer story");
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        let err = parse_feed(b"<html>not a feed", "https://bad.example.com", 0, 10, fetched_at()).unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }

    #[test]
    fn test_parse_feed_empty_channel() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Quiet</title>
            <link>https://quiet.example.com</link><description>none</description></channel></rss>"#;
        let articles = parse_feed(empty.as_bytes(), "https://quiet.example.com/rss", 0, 10, fetched_at()).unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn test_read_all_isolates_failures() {
        let reader = reader(&[("https://news.example.com/rss", RSS)]);
        let feeds = vec![
            "https://broken.example.com/rss".to_string(),
            "https://news.example.com/rss".to_string(),
        ];
        let batch = reader.read_all(&feeds, 25).await;
        assert_eq!(batch.articles.len(), 2);
        assert!(batch.articles.iter().all(|a| a.feed_position == 1));
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].feed_url, "https://broken.example.com/rss");
        assert!(matches!(batch.failures[0].error, Error::Feed(_)));
    }

    #[tokio::test]
    async fn test_complete_content_fetches_page() {
        let page = format!(
            r#"<html><head><meta property="og:image" content="https://cdn.example.com/og.png"></head>
            <body><article><p>{}</p></article></body></html>"#,
            "Full article text. ".repeat(40)
        );
        let reader = reader(&[("https://news.example.com/newer", page.as_str())]);
        let articles = parse_feed(RSS.as_bytes(), "https://news.example.com/rss", 0, 10, fetched_at()).unwrap();

        let completed = reader.complete_content(articles[0].clone()).await;
        assert!(completed.content.starts_with("Full article text."));
        assert_eq!(completed.image_urls.last().map(String::as_str), Some("https://cdn.example.com/og.png"));

        // Unreachable page: the feed text is kept.
        let kept = reader.complete_content(articles[1].clone()).await;
        assert_eq!(kept.content, articles[1].content);
    }

    #[tokio::test]
    async fn test_complete_content_disabled() {
        let reader = reader(&[]).with_full_article(false);
        let articles = parse_feed(RSS.as_bytes(), "https://news.example.com/rss", 0, 10, fetched_at()).unwrap();
        let same = reader.complete_content(articles[0].clone()).await;
        assert_eq!(same, articles[0]);
    }
}
