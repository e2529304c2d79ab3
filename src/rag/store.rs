//! Knowledge chunks and the `ChunkSource` seam the answer engine reads from.

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A retrievable unit of knowledge: text, media references and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Scoring requires non-empty text and an embedding of exactly `dim` values.
    pub fn is_eligible(&self, dim: usize) -> bool {
        !self.text.is_empty() && self.embedding.len() == dim
    }

    pub fn has_media(&self) -> bool {
        !self.images.is_empty() || !self.videos.is_empty()
    }

    pub fn has_usable_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

pub type ChunkStream<'a> = BoxStream<'a, Result<Chunk, ApiError>>;

/// Read-only source of every chunk available for retrieval.
///
/// The stream may be arbitrarily long; consumers take a single pass.
pub trait ChunkSource: Send + Sync {
    fn all(&self) -> ChunkStream<'_>;
}

/// Chunks held in memory, yielded in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryChunkSource {
    chunks: Vec<Chunk>,
}

impl MemoryChunkSource {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ChunkSource for MemoryChunkSource {
    fn all(&self) -> ChunkStream<'_> {
        stream::iter(self.chunks.iter().cloned().map(Ok)).boxed()
    }
}
