use async_trait::async_trait;
use crate::types::{ArticleRecord, GeneratedPost};
use crate::Result;

/// Instructions passed along with each article. Neither value is enforced
/// on the provider's answer.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_words: usize,
    pub style: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_words: 1000,
            style: "informative and engaging".to_string(),
        }
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Characters of article text the provider accepts per request.
    fn context_budget(&self) -> usize;

    /// Turn one article into a post. Fails with `Error::Generation` when the
    /// provider is unreachable, refuses, or answers without usable content.
    async fn generate(&self, article: &ArticleRecord, params: &GenerationParams) -> Result<GeneratedPost>;
}
