use ab_core::{with_retry, ArticleRecord, ContentGenerator, Error, GeneratedPost, GenerationParams, Result, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prompt::build_prompt;
use crate::response::parse_post;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CONTEXT_CHARS: usize = 6000;

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Chat-completions client; any OpenAI-compatible endpoint works through
/// `base_url`.
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    context_chars: usize,
    retry: RetryPolicy,
}

impl fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiGenerator {
    pub fn new(client: Client, api_key: Option<String>, model: String, retry: RetryPolicy) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("OpenAI API key is required".to_string()))?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            context_chars: DEFAULT_CONTEXT_CHARS,
            retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user.to_string() },
            ],
            temperature: 0.7,
            max_tokens: 2500,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { status: status.as_u16(), url });
        }

        let body = response.json::<ChatResponse>().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Generation("OpenAI returned no choices".to_string()))
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    fn context_budget(&self) -> usize {
        self.context_chars
    }

    async fn generate(&self, article: &ArticleRecord, params: &GenerationParams) -> Result<GeneratedPost> {
        let prompt = build_prompt(article, params, self.context_budget());
        let label = format!("OpenAI request for {}", article.url);
        let raw = with_retry(&self.retry, &label, || self.complete(&prompt.system, &prompt.user))
            .await
            .map_err(|e| match e {
                Error::Generation(_) => e,
                other => Error::Generation(format!("OpenAI request failed: {}", other)),
            })?;
        parse_post(&raw, article, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_server::{sample_article, serve};
    use std::time::Duration;

    fn generator(base_url: &str) -> OpenAiGenerator {
        OpenAiGenerator::new(Client::new(), Some("sk-test".into()), "gpt-4o-mini".into(), RetryPolicy::new(2, Duration::ZERO))
            .unwrap()
            .with_base_url(base_url)
    }

    #[test]
    fn test_requires_api_key() {
        let err = OpenAiGenerator::new(Client::new(), None, "m".into(), RetryPolicy::once()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let ok = OpenAiGenerator::new(Client::new(), Some("k".into()), "m".into(), RetryPolicy::once()).unwrap();
        assert!(!format!("{:?}", ok).contains("\"k\""));
    }

    #[tokio::test]
    async fn test_generate_parses_chat_completion() {
        let answer = serde_json::json!({
            "title": "Generated",
            "content": "## Intro\nText",
            "tags": ["rust"],
            "meta_description": "Meta"
        })
        .to_string();
        let body = serde_json::json!({"choices": [{"message": {"role": "assistant", "content": answer}}]}).to_string();
        let server = serve(vec![(200, body)]).await;

        let post = generator(&server.base_url)
            .generate(&sample_article(), &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(post.title, "Generated");
        assert_eq!(post.tags, vec!["rust"]);
        assert_eq!(post.provider, "openai");

        let requests = server.requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /chat/completions"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer sk-test"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let answer = serde_json::json!({"choices": [{"message": {"content": "{\"content\": \"ok\"}"}}]}).to_string();
        let server = serve(vec![(503, "{}".into()), (200, answer)]).await;
        let post = generator(&server.base_url)
            .generate(&sample_article(), &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(post.content, "ok");
        assert_eq!(server.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_generation_error() {
        let server = serve(vec![(401, "{\"error\": \"bad key\"}".into())]).await;
        let err = generator(&server.base_url)
            .generate(&sample_article(), &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
        assert!(err.to_string().contains("401"));
        assert_eq!(server.requests().await.len(), 1);
    }
}
