use ab_core::{parse_front_matter, render_front_matter, Error, FrontMatter, GeneratedPost, Result, SiteConfig};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

lazy_static! {
    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

const SLUG_CHARS: usize = 50;
const MAX_TAGS: usize = 5;
const MAX_CATEGORIES: usize = 2;
const MAX_SUFFIX: usize = 99;

/// Lowercase, runs of anything but `[a-z0-9]` collapsed to `-`, at most
/// `max_len` characters. Never empty.
pub fn slugify(title: &str, max_len: usize) -> String {
    let lowered = title.to_lowercase();
    let collapsed = NON_SLUG.replace_all(&lowered, "-");
    let truncated: String = collapsed.trim_matches('-').chars().take(max_len).collect();
    let slug = truncated.trim_end_matches('-');
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    Written { path: PathBuf, relative_path: PathBuf },
    /// A post for the same source article is already on disk.
    Skipped { path: PathBuf },
}

pub struct PostAssembler {
    site: SiteConfig,
}

impl PostAssembler {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }

    pub fn front_matter(&self, post: &GeneratedPost, date: DateTime<Utc>) -> FrontMatter {
        let description = if post.meta_description.trim().is_empty() {
            format!("Summary of {}", post.title)
        } else {
            post.meta_description.trim().to_string()
        };
        let author = match post.article.author.as_deref() {
            Some(a) if !a.trim().is_empty() => Some(a.trim().to_string()),
            _ => (!self.site.author.is_empty()).then(|| self.site.author.clone()),
        };

        FrontMatter {
            layout: "post".to_string(),
            title: post.title.clone(),
            date: date.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            description,
            tags: self.tags(post),
            categories: self.categories(post),
            image: post.image.as_ref().map(|i| self.image_url(&i.file_name)),
            source_url: Some(post.article.url.clone()),
            source_name: Some(post.article.source.clone()).filter(|s| !s.is_empty()),
            author,
        }
    }

    /// Full file text: front matter, lead image, body, source attribution.
    pub fn render(&self, post: &GeneratedPost, date: DateTime<Utc>) -> Result<String> {
        let mut text = render_front_matter(&self.front_matter(post, date))?;
        text.push('\n');
        if let Some(image) = &post.image {
            text.push_str(&format!("![{}]({})\n\n", post.title, self.image_url(&image.file_name)));
        }
        text.push_str(post.content.trim());
        text.push_str("\n\n");
        let source = if post.article.source.is_empty() {
            post.article.url.as_str()
        } else {
            post.article.source.as_str()
        };
        text.push_str(&format!("*Source: [{}]({})*\n", source, post.article.url));
        Ok(text)
    }

    /// Writes `<posts_dir>/<YYYY-MM-DD>-<slug>.md`. An existing file for the
    /// same article is left alone; an unrelated one pushes the name to
    /// `-2`, `-3`, ...
    pub async fn assemble(&self, post: &GeneratedPost, date: DateTime<Utc>) -> Result<AssemblyOutcome> {
        let posts_dir = self.site.posts_path();
        fs::create_dir_all(&posts_dir).await?;

        let stem = format!("{}-{}", date.format("%Y-%m-%d"), slugify(&post.title, SLUG_CHARS));
        let text = self.render(post, date)?;

        for n in 1..=MAX_SUFFIX {
            let file_name = if n == 1 {
                format!("{}.md", stem)
            } else {
                format!("{}-{}.md", stem, n)
            };
            let path = posts_dir.join(&file_name);

            if fs::try_exists(&path).await? {
                if same_source(&path, &post.article.url).await {
                    info!("📄 {} already holds {}", path.display(), post.article.url);
                    return Ok(AssemblyOutcome::Skipped { path });
                }
                debug!("{} is taken", path.display());
                continue;
            }

            let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(text.as_bytes()).await?;
            file.sync_all().await?;

            info!("📄 Wrote {}", path.display());
            return Ok(AssemblyOutcome::Written {
                relative_path: self.site.posts_dir.join(&file_name),
                path,
            });
        }

        Err(Error::Collision(posts_dir.join(format!("{}.md", stem))))
    }

    fn image_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.site.image_url_prefix(), file_name)
    }

    fn tags(&self, post: &GeneratedPost) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in &post.tags {
            let slug = slugify(tag, SLUG_CHARS);
            if !tag.trim().is_empty() && !tags.contains(&slug) {
                tags.push(slug);
            }
        }
        if tags.is_empty() {
            tags = self.site.tags.clone();
        }
        tags.truncate(MAX_TAGS);
        tags
    }

    fn categories(&self, post: &GeneratedPost) -> Vec<String> {
        let chosen: Vec<String> = post
            .categories
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let mut categories = if chosen.is_empty() { self.site.categories.clone() } else { chosen };
        categories.truncate(MAX_CATEGORIES);
        categories
    }
}

async fn same_source(path: &Path, url: &str) -> bool {
    match fs::read_to_string(path).await {
        Ok(text) => parse_front_matter(&text)
            .map(|(fm, _)| fm.source_url.as_deref() == Some(url))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_core::{ArticleRecord, ImageAsset};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn site(root: &Path) -> SiteConfig {
        SiteConfig {
            repo_path: root.to_path_buf(),
            posts_dir: PathBuf::from("_posts"),
            images_dir: PathBuf::from("assets/images"),
            categories: vec!["Tech".into(), "News".into(), "Misc".into()],
            tags: vec!["general".into()],
            author: "Site Bot".into(),
            site_url: "https://blog.example.com".into(),
            image_max_width: None,
        }
    }

    fn post(title: &str, url: &str) -> GeneratedPost {
        GeneratedPost {
            article: ArticleRecord {
                feed_url: "https://example.com/feed".into(),
                feed_position: 0,
                entry_position: 0,
                url: url.into(),
                title: "Original".into(),
                summary: "Summary".into(),
                content: "Content".into(),
                published_at: date(),
                image_urls: vec![],
                source: "Example News".into(),
                categories: vec![],
                author: None,
            },
            title: title.into(),
            content: "## Heading\n\nBody paragraph.".into(),
            tags: vec!["Rust Lang".into(), "rust-lang".into(), "".into(), "a".into(), "b".into(), "c".into(), "d".into()],
            categories: vec![],
            keywords: vec![],
            meta_description: "".into(),
            image: None,
            degraded: false,
            provider: "dummy".into(),
        }
    }

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 15, 0).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!", 50), "hello-world");
        assert_eq!(slugify("  --Rust 2.0: what's new?--  ", 50), "rust-2-0-what-s-new");
        assert_eq!(slugify("!!!", 50), "post");
        assert_eq!(slugify("", 50), "post");
        assert_eq!(slugify("abc def ghi", 4), "abc");
        assert!(slugify(&"long title ".repeat(20), 50).chars().count() <= 50);
    }

    #[tokio::test]
    async fn test_assemble_writes_post() {
        let dir = tempdir().unwrap();
        let assembler = PostAssembler::new(site(dir.path()));
        let mut generated = post("Rust: a \"new\" release", "https://example.com/a");
        generated.image = Some(ImageAsset {
            source_url: "https://cdn.example.com/a.png".into(),
            path: dir.path().join("assets/images/a.png"),
            file_name: "a.png".into(),
            width: 10,
            height: 10,
        });

        let outcome = assembler.assemble(&generated, date()).await.unwrap();
        let AssemblyOutcome::Written { path, relative_path } = outcome else {
            panic!("expected a written post");
        };
        assert_eq!(relative_path, PathBuf::from("_posts/2024-05-01-rust-a-new-release.md"));

        let text = std::fs::read_to_string(&path).unwrap();
        let (fm, body) = parse_front_matter(&text).unwrap();
        assert_eq!(fm.layout, "post");
        assert_eq!(fm.title, "Rust: a \"new\" release");
        assert_eq!(fm.date, "2024-05-01 09:15:00 +0000");
        assert_eq!(fm.description, "Summary of Rust: a \"new\" release");
        assert_eq!(fm.tags, vec!["rust-lang", "a", "b", "c", "d"]);
        assert_eq!(fm.categories, vec!["Tech", "News"]);
        assert_eq!(fm.image.as_deref(), Some("/assets/images/a.png"));
        assert_eq!(fm.source_url.as_deref(), Some("https://example.com/a"));
        assert_eq!(fm.author.as_deref(), Some("Site Bot"));
        assert!(body.contains("![Rust: a \"new\" release](/assets/images/a.png)"));
        assert!(body.contains("Body paragraph."));
        assert!(body.trim_end().ends_with("*Source: [Example News](https://example.com/a)*"));
    }

    #[tokio::test]
    async fn test_same_article_is_skipped() {
        let dir = tempdir().unwrap();
        let assembler = PostAssembler::new(site(dir.path()));
        let generated = post("Same title", "https://example.com/a");

        let first = assembler.assemble(&generated, date()).await.unwrap();
        let second = assembler.assemble(&generated, date()).await.unwrap();
        let AssemblyOutcome::Written { path, .. } = first else { panic!("first write") };
        assert_eq!(second, AssemblyOutcome::Skipped { path });
    }

    #[tokio::test]
    async fn test_title_collision_gets_suffix() {
        let dir = tempdir().unwrap();
        let assembler = PostAssembler::new(site(dir.path()));

        assembler.assemble(&post("Same title", "https://example.com/a"), date()).await.unwrap();
        let outcome = assembler.assemble(&post("Same title", "https://example.com/b"), date()).await.unwrap();
        match outcome {
            AssemblyOutcome::Written { relative_path, .. } => {
                assert_eq!(relative_path, PathBuf::from("_posts/2024-05-01-same-title-2.md"))
            }
            other => panic!("unexpected {:?}", other),
        }

        // Hand-written posts without front matter count as taken names.
        std::fs::write(dir.path().join("_posts/2024-05-01-same-title-3.md"), "no front matter").unwrap();
        let outcome = assembler.assemble(&post("Same title", "https://example.com/c"), date()).await.unwrap();
        assert!(matches!(
            outcome,
            AssemblyOutcome::Written { relative_path, .. } if relative_path.ends_with("2024-05-01-same-title-4.md")
        ));
    }

    #[tokio::test]
    async fn test_ai_categories_and_empty_tags() {
        let dir = tempdir().unwrap();
        let assembler = PostAssembler::new(site(dir.path()));
        let mut generated = post("Cats", "https://example.com/cats");
        generated.tags.clear();
        generated.categories = vec!["Animals".into(), " ".into(), "Pets".into(), "Extra".into()];
        generated.meta_description = "Cats are great".into();

        let fm = assembler.front_matter(&generated, date());
        assert_eq!(fm.tags, vec!["general"]);
        assert_eq!(fm.categories, vec!["Animals", "Pets"]);
        assert_eq!(fm.description, "Cats are great");
        assert!(fm.image.is_none());
    }
}
