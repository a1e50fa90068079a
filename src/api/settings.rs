use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SettingRequest {
    pub value: String,
}

/// Upsert one setting and drop the process-local cache.
pub async fn put_setting(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SettingRequest>,
) -> Result<StatusCode, AppError> {
    if key.trim().is_empty() {
        return Err(AppError::BadRequest("setting key must not be empty".into()));
    }
    state.settings.set(&key, &req.value).await?;
    Ok(StatusCode::NO_CONTENT)
}
