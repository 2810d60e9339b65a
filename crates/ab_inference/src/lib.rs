pub mod prompt;
pub mod providers;
pub mod response;

pub use providers::{create_generator, DummyGenerator, GeminiGenerator, OpenAiGenerator, Provider};
pub use response::parse_post;

pub mod prelude {
    pub use super::providers::create_generator;
    pub use ab_core::{ContentGenerator, GeneratedPost, GenerationParams, Result, Error};
}
