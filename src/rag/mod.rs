//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `ChunkSource`: read-only access to the knowledge chunks (`SqliteChunkStore`, `MemoryChunkSource`)
//! - `retrieval`: cosine-distance scoring and top-k selection
//! - `visual`: keyword classifier for questions asking for images or video
//! - `prompt`: grounded prompt composition with the conversation tail
//! - `media`: choosing and de-duplicating media references
//! - `AnswerEngine`: the pipeline tying the above to the providers

mod engine;
pub mod media;
pub mod prompt;
pub mod retrieval;
mod sqlite;
mod store;
pub mod visual;

#[cfg(test)]
mod tests;

pub use engine::{Answer, AnswerEngine, EngineConfig, EngineOptions};
pub use media::{MediaBranch, MediaSelection};
pub use prompt::{ConversationTurn, Role};
pub use retrieval::{RetrievalParams, ScoredChunk};
pub use sqlite::SqliteChunkStore;
pub use store::{Chunk, ChunkSource, ChunkStream, MemoryChunkSource};
pub use visual::VisualKeywords;
