use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::core::security::{require_api_key, require_user_id};
use crate::settings::UserSettings;
use crate::state::AppState;

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;
    let user_id = require_user_id(&headers)?;

    let settings = state.settings.get(&user_id).await?.unwrap_or_default();
    Ok(Json(json!({ "settings": settings.redacted() })))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UserSettings>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;
    let user_id = require_user_id(&headers)?;

    let settings = state.settings.upsert(&user_id, payload).await?;
    tracing::info!(user_id = %user_id, "User settings updated");
    Ok(Json(json!({ "settings": settings.redacted() })))
}

pub async fn delete_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_key)?;
    let user_id = require_user_id(&headers)?;

    let deleted = state.settings.delete(&user_id).await?;
    Ok(Json(json!({ "success": deleted })))
}
