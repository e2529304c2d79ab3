use async_trait::async_trait;

use super::types::GenerationOverrides;
use crate::core::errors::ApiError;
use crate::vector_math::cosine_distance;

/// Text generation backend consumed by the answer engine.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    /// Generate a completion for a fully composed prompt.
    ///
    /// `overrides` replaces the provider's configured model, temperature,
    /// token limit or credential for this call only.
    async fn generate(
        &self,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String, ApiError>;
}

/// Text-to-vector backend consumed by retrieval.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;

    /// Cosine distance between two vectors of equal length.
    ///
    /// Returns `NaN` when the vectors cannot be compared; callers treat a
    /// non-finite distance as "not a candidate".
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_distance(a, b).unwrap_or(f32::NAN)
    }
}
