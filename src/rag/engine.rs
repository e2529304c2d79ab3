//! Retrieval-augmented answer engine.
//!
//! One `answer` call runs a strictly sequential pipeline:
//! embed → rank chunks → compose prompt → generate → select media.
//! The engine keeps no mutable state between calls, so a shared instance
//! can serve concurrent requests.

use std::sync::Arc;

use serde::Serialize;

use super::media::{select_media, MediaBranch};
use super::prompt::{compose, conversation_tail, ConversationTurn};
use super::retrieval::{retrieve, RetrievalParams};
use super::store::{Chunk, ChunkSource};
use super::visual::VisualKeywords;
use crate::core::config::defaults::{
    DEFAULT_EMBEDDING_DIM, DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_MEDIA_CHUNKS,
    DEFAULT_MIN_RELEVANCE, DEFAULT_SYSTEM_PROMPT, DEFAULT_TOP_K, DEFAULT_VISUAL_TOP_K_FLOOR,
};
use crate::core::config::RetrievalConfig;
use crate::core::errors::ApiError;
use crate::llm::{EmbeddingProvider, GenerationOverrides, LanguageModelProvider};

/// Per-call settings. Absent config means [`EngineConfig::default`] (or the
/// engine's configured defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of chunks used as context.
    pub top_k: usize,
    /// Largest cosine distance a chunk may have to be considered.
    pub min_relevance: f32,
    pub system_prompt: String,
    /// Forwarded untouched to the language model provider.
    pub overrides: GenerationOverrides,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            overrides: GenerationOverrides::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_retrieval(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_relevance: config.min_relevance,
            system_prompt: config.system_prompt.clone(),
            overrides: GenerationOverrides::default(),
        }
    }
}

/// Engine-wide settings that do not vary per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    pub embedding_dim: usize,
    /// Minimum `top_k` used for visual questions.
    pub visual_top_k_floor: usize,
    /// Most recent conversation turns included in the prompt.
    pub history_window: usize,
    /// Media chunks consulted for non-visual questions.
    pub max_media_chunks: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            visual_top_k_floor: DEFAULT_VISUAL_TOP_K_FLOOR,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_media_chunks: DEFAULT_MAX_MEDIA_CHUNKS,
        }
    }
}

impl From<&RetrievalConfig> for EngineOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            embedding_dim: config.embedding_dim,
            visual_top_k_floor: config.visual_top_k_floor,
            history_window: config.history_window,
            max_media_chunks: config.max_media_chunks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    #[serde(skip)]
    pub media_branch: MediaBranch,
}

pub struct AnswerEngine {
    embeddings: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModelProvider>,
    chunks: Arc<dyn ChunkSource>,
    visual: VisualKeywords,
    options: EngineOptions,
    defaults: EngineConfig,
}

impl AnswerEngine {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModelProvider>,
        chunks: Arc<dyn ChunkSource>,
    ) -> Self {
        Self {
            embeddings,
            llm,
            chunks,
            visual: VisualKeywords::default(),
            options: EngineOptions::default(),
            defaults: EngineConfig::default(),
        }
    }

    /// Apply engine options, defaults and extra visual keywords from config.
    pub fn with_retrieval_config(mut self, config: &RetrievalConfig) -> Self {
        self.options = EngineOptions::from(config);
        self.defaults = EngineConfig::from_retrieval(config);
        self.visual = VisualKeywords::with_extra(&config.visual_keywords);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_visual_keywords(mut self, visual: VisualKeywords) -> Self {
        self.visual = visual;
        self
    }

    pub fn default_config(&self) -> &EngineConfig {
        &self.defaults
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Answer `question` grounded on the knowledge base.
    ///
    /// Provider failures abort the call; no partial answer is produced. An
    /// empty retrieval still reaches the language model.
    pub async fn answer(
        &self,
        question: &str,
        history: Option<&[ConversationTurn]>,
        config: Option<&EngineConfig>,
    ) -> Result<Answer, ApiError> {
        let config = config.unwrap_or(&self.defaults);

        let is_visual = self.visual.is_visual(question);
        let top_k = if is_visual {
            config.top_k.max(self.options.visual_top_k_floor)
        } else {
            config.top_k
        };
        let params = RetrievalParams {
            top_k,
            min_relevance: config.min_relevance,
            embedding_dim: self.options.embedding_dim,
        };

        let scored = retrieve(
            self.embeddings.as_ref(),
            self.chunks.as_ref(),
            question,
            params,
        )
        .await?;
        let retrieved: Vec<&Chunk> = scored.iter().map(|s| &s.chunk).collect();

        let tail = history
            .map(|turns| conversation_tail(turns, self.options.history_window))
            .unwrap_or(&[]);
        let prompt = compose(&config.system_prompt, &retrieved, tail, question);

        let text = self.llm.generate(&prompt, &config.overrides).await?;

        let media = select_media(&retrieved, is_visual, self.options.max_media_chunks);
        tracing::debug!(
            visual = is_visual,
            top_k,
            retrieved = retrieved.len(),
            history_turns = tail.len(),
            branch = ?media.branch,
            "Answer composed"
        );

        Ok(Answer {
            text,
            images: media.images,
            videos: media.videos,
            media_branch: media.branch,
        })
    }
}
