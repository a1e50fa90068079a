use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::FraudFlag;
use crate::error::AppError;
use crate::orchestration::FlagReview;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRequest {
    pub ambassador_id: Uuid,
}

pub async fn record_click(
    State(state): State<AppState>,
    Json(req): Json<ClickRequest>,
) -> Result<StatusCode, AppError> {
    state.fraud.record_click(req.ambassador_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn list_flags(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<FraudFlag>>, AppError> {
    Ok(Json(state.repo.list_flags_for_user(user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveFlagRequest {
    pub review: FlagReview,
}

pub async fn resolve_flag(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<ResolveFlagRequest>,
) -> Result<StatusCode, AppError> {
    state.fraud.resolve_flag(id, req.review).await?;
    Ok(StatusCode::NO_CONTENT)
}
