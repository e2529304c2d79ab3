use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::require_api_key;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;

    let chunks = state.chunks.count().await?;
    let total_messages = state.history.get_total_message_count().await?;

    Ok(Json(json!({
        "initialized": true,
        "chunks": chunks,
        "total_messages": total_messages,
        "chat_model": state.config.llm.chat_model,
        "embedding_model": state.config.llm.embedding_model,
        "llm_key_configured": state.config.llm.api_key.is_some()
    })))
}
