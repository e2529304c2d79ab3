use axum::http::HeaderMap;

use crate::core::errors::ApiError;

const API_KEY_HEADER: &str = "x-api-key";
const USER_ID_HEADER: &str = "x-user-id";
const MAX_USER_ID_LEN: usize = 128;

/// Shared key guarding `/api/*`. An unset key leaves the API open.
#[derive(Debug, Clone, Default)]
pub struct ApiKey {
    value: Option<String>,
}

impl ApiKey {
    pub fn new(value: Option<String>) -> Self {
        let value = value.filter(|v| !v.trim().is_empty());
        Self { value }
    }

    pub fn is_enabled(&self) -> bool {
        self.value.is_some()
    }
}

pub fn require_api_key(headers: &HeaderMap, expected: &ApiKey) -> Result<(), ApiError> {
    let Some(expected) = expected.value.as_deref() else {
        return Ok(());
    };

    let header_value = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if header_value.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    if header_value != expected {
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

/// Caller identity for per-user settings. Absent header means "no settings".
pub fn user_id(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(raw) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let value = raw
        .to_str()
        .map_err(|_| ApiError::BadRequest("x-user-id must be visible ASCII".to_string()))?
        .trim();

    if value.is_empty() {
        return Ok(None);
    }
    if value.len() > MAX_USER_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "x-user-id longer than {} characters",
            MAX_USER_ID_LEN
        )));
    }
    Ok(Some(value.to_string()))
}

pub fn require_user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    user_id(headers)?.ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}
