//! SQLite-backed chunk store.
//!
//! Chunks are kept with their media references as JSON arrays and their
//! embedding as a little-endian f32 blob. `all()` streams rows straight from
//! the cursor so the full knowledge base is never materialized.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::store::{Chunk, ChunkSource, ChunkStream};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteChunkStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

/// Import shape; accepts both current field names and the legacy document names.
#[derive(Debug, Deserialize)]
struct ChunkDocument {
    #[serde(default, alias = "_id")]
    id: Option<Value>,
    #[serde(default, alias = "texto")]
    text: String,
    #[serde(default, alias = "imagenes")]
    images: Vec<String>,
    #[serde(default)]
    videos: Vec<String>,
    #[serde(default, alias = "vector")]
    embedding: Vec<f32>,
}

impl ChunkDocument {
    fn into_chunk(self) -> Chunk {
        let id = match self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            // Mongo extended JSON: {"$oid": "..."}
            Some(Value::Object(map)) => map
                .get("$oid")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            Some(Value::Number(n)) => n.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        Chunk {
            id: Some(id),
            text: self.text,
            images: self.images,
            videos: self.videos,
            embedding: self.embedding,
        }
    }
}

impl SqliteChunkStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.knowledge_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                videos TEXT NOT NULL DEFAULT '[]',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn decode_media(raw: &str) -> Vec<String> {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk, sqlx::Error> {
        let images: String = row.try_get("images")?;
        let videos: String = row.try_get("videos")?;
        let embedding: Option<Vec<u8>> = row.try_get("embedding")?;

        Ok(Chunk {
            id: row.try_get("id")?,
            text: row.try_get("text")?,
            images: Self::decode_media(&images),
            videos: Self::decode_media(&videos),
            embedding: embedding
                .as_deref()
                .map(Self::deserialize_embedding)
                .unwrap_or_default(),
        })
    }

    /// Upsert one chunk; assigns a UUID when the chunk has no id.
    pub async fn insert(&self, chunk: &Chunk) -> Result<String, ApiError> {
        let ids = self.insert_batch(std::slice::from_ref(chunk)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("chunk insert returned no id".to_string()))
    }

    pub async fn insert_batch(&self, chunks: &[Chunk]) -> Result<Vec<String>, ApiError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let id = chunk
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let images = serde_json::to_string(&chunk.images).map_err(ApiError::internal)?;
            let videos = serde_json::to_string(&chunk.videos).map_err(ApiError::internal)?;
            let blob = Self::serialize_embedding(&chunk.embedding);

            sqlx::query(
                "INSERT INTO chunks (id, text, images, videos, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    images = excluded.images,
                    videos = excluded.videos,
                    embedding = excluded.embedding",
            )
            .bind(&id)
            .bind(&chunk.text)
            .bind(&images)
            .bind(&videos)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

            ids.push(id);
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(ids)
    }

    /// Import a JSON array of chunk documents. Returns how many were stored.
    pub async fn import_json(&self, path: &Path) -> Result<usize, ApiError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ApiError::BadRequest(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let documents: Vec<ChunkDocument> = serde_json::from_str(&raw).map_err(|e| {
            ApiError::BadRequest(format!("Invalid chunk file {}: {}", path.display(), e))
        })?;

        let chunks: Vec<Chunk> = documents.into_iter().map(ChunkDocument::into_chunk).collect();
        let imported = self.insert_batch(&chunks).await?.len();
        tracing::info!("Imported {} chunks from {}", imported, path.display());
        Ok(imported)
    }

    pub async fn count(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}

impl ChunkSource for SqliteChunkStore {
    fn all(&self) -> ChunkStream<'_> {
        sqlx::query("SELECT id, text, images, videos, embedding FROM chunks ORDER BY rowid")
            .fetch(&self.pool)
            .map(|row| {
                row.and_then(|row| Self::row_to_chunk(&row))
                    .map_err(ApiError::internal)
            })
            .boxed()
    }
}
