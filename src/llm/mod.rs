pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::{EmbeddingProvider, LanguageModelProvider};
pub use types::{ChatMessage, GenerationOverrides};
