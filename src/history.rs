use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::rag::{ConversationTurn, Role};

const SCHEMA_VERSION: i64 = 1;
const MAX_HISTORY_LIMIT: i64 = 1000;
const GENERATED_TITLE_CHARS: usize = 50;
const MAX_TITLE_LEN: usize = 160;
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

impl From<HistoryMessage> for ConversationTurn {
    fn from(message: HistoryMessage) -> Self {
        ConversationTurn {
            role: message.role,
            content: message.content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn open(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::new(paths.db_path.clone()).await
    }

    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { db_path, pool };
        store.init_db().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_db(&self) -> Result<(), ApiError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if version != SCHEMA_VERSION {
            self.create_schema().await?;
        }

        Ok(())
    }

    async fn create_schema(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL CHECK(length(trim(title)) > 0),
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC)")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_id_id ON messages(session_id, id)",
        )
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT s.id, s.title, s.created_at, s.updated_at,
                   (SELECT COUNT(*) FROM messages WHERE session_id = s.id) as message_count,
                   (SELECT content FROM messages WHERE session_id = s.id ORDER BY id DESC LIMIT 1) as last_message
            FROM sessions s
            ORDER BY s.updated_at DESC, s.rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(session_info_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn create_session(&self, title: Option<String>) -> Result<String, ApiError> {
        let session_id = Uuid::new_v4().to_string();
        let title = normalize_title(title);

        sqlx::query("INSERT INTO sessions (id, title) VALUES (?1, ?2)")
            .bind(&session_id)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        tracing::debug!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>, ApiError> {
        let row =
            sqlx::query("SELECT id, title, created_at, updated_at FROM sessions WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        row.map(session_detail_from_row)
            .transpose()
            .map_err(ApiError::internal)
    }

    pub async fn update_session_title(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<bool, ApiError> {
        let title = normalize_title(Some(title.to_string()));

        let result = sqlx::query(
            "UPDATE sessions SET title = ?1, updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        )
        .bind(title)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the session and, through the cascade, its messages.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    /// The latest `limit` messages of a session, oldest first.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryMessage>, ApiError> {
        let limit = sanitize_limit(limit);

        let rows = sqlx::query(
            "\
            SELECT id, role, content, created_at
            FROM (
                SELECT id, role, content, created_at
                FROM messages
                WHERE session_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            )
            ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(history_message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    /// Every turn of a session, oldest first.
    pub async fn get_turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM messages WHERE session_id = ?1 ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.into_iter()
            .map(|row| history_message_from_row(row).map(ConversationTurn::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::internal)
    }

    pub async fn get_message_count(&self, session_id: &str) -> Result<i64, ApiError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    pub async fn get_total_message_count(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    /// Appends a message and bumps the session's `updated_at`.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let touched = sqlx::query(
            "UPDATE sessions SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        if touched.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!(
                "session {} not found",
                session_id
            )));
        }

        sqlx::query("INSERT INTO messages (session_id, role, content) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(role.as_str())
            .bind(content)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}

/// Title for a session started by `first_message`.
pub fn generate_session_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.is_empty() {
        return fallback_title();
    }

    let mut title: String = trimmed.chars().take(GENERATED_TITLE_CHARS).collect();
    if trimmed.chars().count() > GENERATED_TITLE_CHARS {
        title.push_str("...");
    }
    title
}

fn session_info_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SessionInfo, sqlx::Error> {
    let last_message: Option<String> = row.try_get("last_message")?;
    let preview = last_message
        .unwrap_or_default()
        .chars()
        .take(PREVIEW_CHARS)
        .collect();

    Ok(SessionInfo {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        message_count: row.try_get("message_count")?,
        preview,
    })
}

fn session_detail_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SessionDetail, sqlx::Error> {
    Ok(SessionDetail {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn history_message_from_row(row: sqlx::sqlite::SqliteRow) -> Result<HistoryMessage, sqlx::Error> {
    let raw_role: String = row.try_get("role")?;
    let role = match raw_role.as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    Ok(HistoryMessage {
        id: row.try_get("id")?,
        role,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn sanitize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        return 1;
    }
    limit.min(MAX_HISTORY_LIMIT)
}

fn fallback_title() -> String {
    format!("Conversación {}", Utc::now().format("%Y-%m-%d %H:%M"))
}

fn normalize_title(title: Option<String>) -> String {
    let Some(raw) = title else {
        return fallback_title();
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback_title();
    }

    trimmed.chars().take(MAX_TITLE_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> HistoryStore {
        let tmp = std::env::temp_dir().join(format!("kbchat-history-test-{}.db", Uuid::new_v4()));
        HistoryStore::new(tmp).await.unwrap()
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = test_store().await;

        let id = store
            .create_session(Some("Viaje a Quito".to_string()))
            .await
            .unwrap();
        let detail = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(detail.title, "Viaje a Quito");

        assert!(store.update_session_title(&id, "  Nuevo título ").await.unwrap());
        let detail = store.get_session(&id).await.unwrap().unwrap();
        assert_eq!(detail.title, "Nuevo título");

        store.add_message(&id, Role::User, "hola").await.unwrap();
        assert!(store.delete_session(&id).await.unwrap());
        assert!(store.get_session(&id).await.unwrap().is_none());
        assert_eq!(store.get_message_count(&id).await.unwrap(), 0);
        assert!(!store.delete_session(&id).await.unwrap());
    }

    #[tokio::test]
    async fn history_returns_latest_messages_in_order() {
        let store = test_store().await;
        let id = store.create_session(None).await.unwrap();

        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .add_message(&id, role, &format!("m{}", i))
                .await
                .unwrap();
        }

        let latest = store.get_history(&id, 3).await.unwrap();
        let contents: Vec<_> = latest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(latest[1].role, Role::Assistant);

        let turns = store.get_turns(&id).await.unwrap();
        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0], ConversationTurn::user("m0"));
        assert_eq!(turns[4], ConversationTurn::user("m4"));

        assert_eq!(store.get_message_count(&id).await.unwrap(), 5);
        assert_eq!(store.get_total_message_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn list_sessions_orders_by_activity() {
        let store = test_store().await;
        let first = store.create_session(Some("primera".to_string())).await.unwrap();
        let second = store.create_session(Some("segunda".to_string())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .add_message(&first, Role::User, "mensaje reciente")
            .await
            .unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, first);
        assert_eq!(sessions[0].message_count, 1);
        assert_eq!(sessions[0].preview, "mensaje reciente");
        assert_eq!(sessions[1].id, second);
        assert_eq!(sessions[1].preview, "");
    }

    #[tokio::test]
    async fn add_message_to_unknown_session_is_not_found() {
        let store = test_store().await;
        let err = store
            .add_message("missing", Role::User, "hola")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn generated_titles_truncate_at_fifty_chars() {
        assert_eq!(generate_session_title("¿Qué ver en Baños?"), "¿Qué ver en Baños?");

        let long = "á".repeat(60);
        let title = generate_session_title(&long);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));

        let exact = "x".repeat(50);
        assert_eq!(generate_session_title(&exact), exact);

        assert!(generate_session_title("   ").starts_with("Conversación "));
    }
}
