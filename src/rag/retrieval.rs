//! Chunk scoring and top-k selection.
//!
//! Candidates are scored by cosine distance (lower is better), dropped when
//! the distance exceeds `min_relevance`, and ranked ascending. Ties keep the
//! order in which the chunk source yielded them.

use futures_util::TryStreamExt;

use super::store::{Chunk, ChunkSource};
use crate::core::errors::ApiError;
use crate::llm::EmbeddingProvider;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub min_relevance: f32,
    pub embedding_dim: usize,
}

/// A chunk with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub distance: f32,
    pub chunk: Chunk,
}

/// Single-pass ranker that never holds more than `top_k` candidates.
pub struct ChunkRanker<'a> {
    embeddings: &'a dyn EmbeddingProvider,
    query: &'a [f32],
    params: RetrievalParams,
    best: Vec<ScoredChunk>,
    skipped: usize,
    below_threshold: usize,
}

impl<'a> ChunkRanker<'a> {
    pub fn new(
        embeddings: &'a dyn EmbeddingProvider,
        query: &'a [f32],
        params: RetrievalParams,
    ) -> Self {
        Self {
            embeddings,
            query,
            params,
            best: Vec::new(),
            skipped: 0,
            below_threshold: 0,
        }
    }

    pub fn consider(&mut self, chunk: Chunk) {
        if !chunk.is_eligible(self.params.embedding_dim) {
            self.skipped += 1;
            return;
        }

        let distance = self.embeddings.distance(self.query, &chunk.embedding);
        if !distance.is_finite() {
            self.skipped += 1;
            return;
        }
        if distance > self.params.min_relevance {
            self.below_threshold += 1;
            return;
        }

        // Insert after every candidate with an equal or smaller distance so
        // earlier chunks win ties.
        let position = self.best.partition_point(|s| s.distance <= distance);
        if position >= self.params.top_k {
            return;
        }
        self.best.insert(position, ScoredChunk { distance, chunk });
        self.best.truncate(self.params.top_k);
    }

    pub fn finish(self) -> Vec<ScoredChunk> {
        tracing::debug!(
            selected = self.best.len(),
            skipped = self.skipped,
            below_threshold = self.below_threshold,
            "Ranked knowledge chunks"
        );
        self.best
    }
}

/// Rank an in-memory set of chunks against an already computed query vector.
pub fn rank_chunks<I>(
    embeddings: &dyn EmbeddingProvider,
    query: &[f32],
    chunks: I,
    params: RetrievalParams,
) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = Chunk>,
{
    let mut ranker = ChunkRanker::new(embeddings, query, params);
    for chunk in chunks {
        ranker.consider(chunk);
    }
    ranker.finish()
}

/// Embed `query` and select at most `top_k` chunks from `source`, best first.
///
/// Embedding failures and chunk source errors abort the call. Chunks with
/// empty text or a wrong-sized embedding are skipped silently.
pub async fn retrieve(
    embeddings: &dyn EmbeddingProvider,
    source: &dyn ChunkSource,
    query: &str,
    params: RetrievalParams,
) -> Result<Vec<ScoredChunk>, ApiError> {
    let query_vector = embeddings.embed(query).await?;
    if query_vector.len() != params.embedding_dim {
        return Err(ApiError::Provider(format!(
            "query embedding has {} dimensions, expected {}",
            query_vector.len(),
            params.embedding_dim
        )));
    }

    let mut ranker = ChunkRanker::new(embeddings, &query_vector, params);
    let mut stream = source.all();
    while let Some(chunk) = stream.try_next().await? {
        ranker.consider(chunk);
    }
    Ok(ranker.finish())
}
