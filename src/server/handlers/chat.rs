use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::core::security::{require_api_key, user_id};
use crate::history::generate_session_title;
use crate::rag::{Answer, EngineConfig, Role};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatWithHistoryRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatWithHistoryResponse {
    #[serde(flatten)]
    pub answer: Answer,
    pub session_id: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;
    let question = validate_question(&payload.question)?;
    let config = caller_config(&state, &headers).await?;

    let answer = state.engine.answer(question, None, config.as_ref()).await?;
    Ok(Json(answer))
}

/// Answer within a stored conversation.
///
/// Without `session_id` a new session is opened and titled after the
/// question. The question is stored before answering, the answer after.
pub async fn chat_with_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatWithHistoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;
    let question = validate_question(&payload.question)?;
    let config = caller_config(&state, &headers).await?;

    let (session_id, history) = match payload.session_id {
        None => {
            let title = generate_session_title(question);
            let session_id = state.history.create_session(Some(title)).await?;
            (session_id, Vec::new())
        }
        Some(session_id) => {
            if state.history.get_session(&session_id).await?.is_none() {
                return Err(ApiError::NotFound("Session not found".to_string()));
            }
            let turns = state.history.get_turns(&session_id).await?;
            (session_id, turns)
        }
    };

    state
        .history
        .add_message(&session_id, Role::User, question)
        .await?;

    let answer = state
        .engine
        .answer(question, Some(history.as_slice()), config.as_ref())
        .await?;

    state
        .history
        .add_message(&session_id, Role::Assistant, &answer.text)
        .await?;

    Ok(Json(ChatWithHistoryResponse { answer, session_id }))
}

fn validate_question(question: &str) -> Result<&str, ApiError> {
    if question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    Ok(question)
}

/// Engine config from the caller's stored settings; `None` uses the engine defaults.
async fn caller_config(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<EngineConfig>, ApiError> {
    let Some(user_id) = user_id(headers)? else {
        return Ok(None);
    };

    let config = state
        .settings
        .engine_config_for(&user_id, &state.config.retrieval)
        .await?;
    Ok(Some(config))
}
