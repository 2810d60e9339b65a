use ab_core::{
    ArticleRecord, ContentGenerator, GeneratedPost, GenerationParams, HttpClient, HttpConfig, InferenceConfig,
    ProviderKind, Result, RetryPolicy,
};
use async_trait::async_trait;
use std::time::Duration;

pub mod dummy;
pub mod gemini;
pub mod openai;

pub use dummy::DummyGenerator;
pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

/// Generation requests run far longer than feed or image fetches.
const MIN_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The closed set of providers, selected by configuration.
#[derive(Debug)]
pub enum Provider {
    OpenAi(OpenAiGenerator),
    Gemini(GeminiGenerator),
    Dummy(DummyGenerator),
}

#[async_trait]
impl ContentGenerator for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::OpenAi(p) => p.name(),
            Provider::Gemini(p) => p.name(),
            Provider::Dummy(p) => p.name(),
        }
    }

    fn context_budget(&self) -> usize {
        match self {
            Provider::OpenAi(p) => p.context_budget(),
            Provider::Gemini(p) => p.context_budget(),
            Provider::Dummy(p) => p.context_budget(),
        }
    }

    async fn generate(&self, article: &ArticleRecord, params: &GenerationParams) -> Result<GeneratedPost> {
        match self {
            Provider::OpenAi(p) => p.generate(article, params).await,
            Provider::Gemini(p) => p.generate(article, params).await,
            Provider::Dummy(p) => p.generate(article, params).await,
        }
    }
}

pub fn create_generator(config: &InferenceConfig, http: &HttpConfig) -> Result<Provider> {
    let retry = RetryPolicy::from(http);
    let http = HttpConfig {
        timeout: http.timeout.max(MIN_GENERATION_TIMEOUT),
        ..http.clone()
    };

    let provider = match config.provider {
        ProviderKind::OpenAi => {
            let client = HttpClient::new(&http)?.inner().clone();
            let mut generator = OpenAiGenerator::new(client, config.api_key.clone(), config.model.clone(), retry)?;
            if let Some(base_url) = &config.base_url {
                generator = generator.with_base_url(base_url.as_str());
            }
            if let Some(chars) = config.context_chars {
                generator = generator.with_context_chars(chars);
            }
            Provider::OpenAi(generator)
        }
        ProviderKind::Gemini => {
            let client = HttpClient::new(&http)?.inner().clone();
            let mut generator = GeminiGenerator::new(client, config.api_key.clone(), config.model.clone(), retry)?;
            if let Some(base_url) = &config.base_url {
                generator = generator.with_base_url(base_url.as_str());
            }
            if let Some(chars) = config.context_chars {
                generator = generator.with_context_chars(chars);
            }
            Provider::Gemini(generator)
        }
        ProviderKind::Dummy => {
            let mut generator = DummyGenerator::new();
            if let Some(chars) = config.context_chars {
                generator = generator.with_context_chars(chars);
            }
            Provider::Dummy(generator)
        }
    };

    tracing::info!("🤖 Using {} provider ({})", provider.name(), config.model);
    Ok(provider)
}
