//! Per-user answer settings.
//!
//! Stored as one JSON payload per user. Unset fields fall back to the
//! configured retrieval defaults when an [`EngineConfig`] is built.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::config::defaults::MAX_TOP_K;
use crate::core::config::{AppPaths, RetrievalConfig};
use crate::core::errors::ApiError;
use crate::llm::GenerationOverrides;
use crate::rag::EngineConfig;

const REDACTED: &str = "****";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub system_prompt: Option<String>,
    pub top_k: Option<usize>,
    pub min_relevance: Option<f32>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
}

impl UserSettings {
    /// Overlay the fields set in `update`.
    pub fn merge(&mut self, update: UserSettings) {
        if update.system_prompt.is_some() {
            self.system_prompt = update.system_prompt;
        }
        if update.top_k.is_some() {
            self.top_k = update.top_k;
        }
        if update.min_relevance.is_some() {
            self.min_relevance = update.min_relevance;
        }
        if update.model.is_some() {
            self.model = update.model;
        }
        if update.temperature.is_some() {
            self.temperature = update.temperature;
        }
        if update.max_tokens.is_some() {
            self.max_tokens = update.max_tokens;
        }
        if update.api_key.is_some() {
            self.api_key = update.api_key;
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(top_k) = self.top_k {
            if !(1..=MAX_TOP_K).contains(&top_k) {
                return Err(ApiError::BadRequest(format!(
                    "top_k must be between 1 and {}",
                    MAX_TOP_K
                )));
            }
        }
        if let Some(value) = self.min_relevance {
            if !(0.0..=2.0).contains(&value) {
                return Err(ApiError::BadRequest(
                    "min_relevance must be between 0 and 2".to_string(),
                ));
            }
        }
        if let Some(value) = self.temperature {
            if !(0.0..=2.0).contains(&value) {
                return Err(ApiError::BadRequest(
                    "temperature must be between 0 and 2".to_string(),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ApiError::BadRequest(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy safe to return to clients.
    pub fn redacted(&self) -> Self {
        let mut view = self.clone();
        if view.api_key.is_some() {
            view.api_key = Some(REDACTED.to_string());
        }
        view
    }

    pub fn to_engine_config(&self, defaults: &RetrievalConfig) -> EngineConfig {
        let system_prompt = self
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| defaults.system_prompt.clone());

        EngineConfig {
            top_k: self.top_k.unwrap_or(defaults.top_k),
            min_relevance: self.min_relevance.unwrap_or(defaults.min_relevance),
            system_prompt,
            overrides: GenerationOverrides {
                api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
                model: self.model.clone().filter(|m| !m.trim().is_empty()),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub async fn open(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::new(paths.db_path.clone()).await
    }

    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserSettings>, ApiError> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM user_settings WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        match payload {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => Ok(Some(settings)),
                Err(err) => {
                    tracing::warn!(user_id, "Ignoring unreadable settings payload: {}", err);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Merge `update` into the stored settings and return the result.
    pub async fn upsert(
        &self,
        user_id: &str,
        update: UserSettings,
    ) -> Result<UserSettings, ApiError> {
        update.validate()?;

        let mut settings = self.get(user_id).await?.unwrap_or_default();
        settings.merge(update);

        let payload = serde_json::to_string(&settings).map_err(ApiError::internal)?;
        sqlx::query(
            "INSERT INTO user_settings (user_id, payload) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(user_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(settings)
    }

    pub async fn delete(&self, user_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM user_settings WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    /// Engine config for `user_id`, or the configured defaults when the user
    /// has no settings.
    pub async fn engine_config_for(
        &self,
        user_id: &str,
        defaults: &RetrievalConfig,
    ) -> Result<EngineConfig, ApiError> {
        Ok(self
            .get(user_id)
            .await?
            .unwrap_or_default()
            .to_engine_config(defaults))
    }
}
