use ab_core::{with_retry, ArticleRecord, ContentGenerator, Error, GeneratedPost, GenerationParams, Result, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::prompt::build_prompt;
use crate::response::{is_structured, parse_post};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CONTEXT_CHARS: usize = 12000;
const NICHE: &str = "tech news, software, programming, AI, emerging technologies";

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    context_chars: usize,
    retry: RetryPolicy,
}

impl fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiGenerator {
    pub fn new(client: Client, api_key: Option<String>, model: String, retry: RetryPolicy) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("Gemini API key is required".to_string()))?;
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

    async fn complete(&self, prompt: &str) -> Result<String> {
        // The key travels in a header so it never shows up in logged URLs.
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 2048,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus { status: status.as_u16(), url });
        }

        let body = response.json::<GenerateResponse>().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::Generation("Gemini returned no candidates".to_string()));
        }
        Ok(text)
    }

    async fn request(&self, prompt: &str, url: &str) -> Result<String> {
        let label = format!("Gemini request for {}", url);
        with_retry(&self.retry, &label, || self.complete(prompt))
            .await
            .map_err(|e| match e {
                Error::Generation(_) => e,
                other => Error::Generation(format!("Gemini request failed: {}", other)),
            })
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn context_budget(&self) -> usize {
        self.context_chars
    }

    /// Gemini gets one extra attempt when its first answer is not JSON,
    /// before falling back to heuristic extraction.
    async fn generate(&self, article: &ArticleRecord, params: &GenerationParams) -> Result<GeneratedPost> {
        let prompt = build_prompt(article, params, self.context_budget())
            .with_relevance_check(NICHE)
            .combined();

        let mut raw = self.request(&prompt, &article.url).await?;
        if !is_structured(&raw) {
            warn!("⚠️ Gemini answer for {} was not JSON, asking once more", article.url);
            let second = self.request(&prompt, &article.url).await?;
            if is_structured(&second) {
                raw = second;
            }
        }
        parse_post(&raw, article, self.name())
    }
}
