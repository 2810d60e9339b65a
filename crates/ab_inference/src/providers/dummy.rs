use ab_core::{ArticleRecord, ContentGenerator, GeneratedPost, GenerationParams, Result};
use async_trait::async_trait;

use crate::prompt::truncate_chars;
use crate::response::parse_post;

pub const DEFAULT_CONTEXT_CHARS: usize = 6000;

/// Offline generator for dry runs and tests. The same article always
/// yields the same post.
#[derive(Debug, Clone)]
pub struct DummyGenerator {
    context_chars: usize,
}

impl Default for DummyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyGenerator {
    pub fn new() -> Self {
        Self {
            context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }
}

#[async_trait]
impl ContentGenerator for DummyGenerator {
    fn name(&self) -> &str {
        "dummy"
    }

    fn context_budget(&self) -> usize {
        self.context_chars
    }

    async fn generate(&self, article: &ArticleRecord, params: &GenerationParams) -> Result<GeneratedPost> {
        let text = truncate_chars(article.body_text(), self.context_budget());
        let words: Vec<&str> = text.split_whitespace().take(params.max_words).collect();
        let body = if words.is_empty() {
            String::new()
        } else {
            format!(
                "## Summary\n\n{}\n\n## Source\n\nOriginally reported by {}.",
                words.join(" "),
                article.source
            )
        };

        let answer = serde_json::json!({
            "title": article.title,
            "content": body,
            "tags": article.categories,
            "meta_description": truncate_chars(&article.summary, 160),
        });
        parse_post(&answer.to_string(), article, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_server::sample_article;
    use ab_core::Error;

    #[tokio::test]
    async fn test_dummy_model() {
        let model = DummyGenerator::new();
        let params = GenerationParams { max_words: 3, style: "plain".into() };
        let post = model.generate(&sample_article(), &params).await.unwrap();
        assert_eq!(post.title, "Rust ships a new release");
        assert!(post.content.contains("The Rust team"));
        assert!(!post.content.contains("announced"));
        assert_eq!(post.tags, vec!["Programming"]);
        assert!(!post.degraded);

        let again = model.generate(&sample_article(), &params).await.unwrap();
        assert_eq!(again.content, post.content);
    }

    #[tokio::test]
    async fn test_empty_article_fails() {
        let mut article = sample_article();
        article.content.clear();
        article.summary.clear();
        let err = DummyGenerator::new()
            .generate(&article, &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}
