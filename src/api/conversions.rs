use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::Conversion;
use crate::error::AppError;
use crate::events::{CashbackCredit, TierUp};
use crate::orchestration::{ConversionParams, Payout, Recorded};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionDto {
    pub id: Uuid,
    pub ambassador_id: Uuid,
    pub sponsor_id: Option<Uuid>,
    pub buyer_user_id: Option<Uuid>,
    pub affiliate_program_id: Uuid,
    pub sale_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_ref: Option<String>,
    pub amount: String,
    pub commission_total: String,
    pub ambassador_share: String,
    pub sponsor_share: String,
    pub buyer_share: String,
    pub platform_share: String,
    pub applied_ambassador_rate: String,
    pub applied_sponsor_rate: String,
    pub applied_buyer_rate: String,
    pub applied_platform_rate: String,
    pub status: String,
    pub created_at: i64,
    pub confirmed_at: Option<i64>,
    pub paid_at: Option<i64>,
}

impl From<Conversion> for ConversionDto {
    fn from(c: Conversion) -> Self {
        ConversionDto {
            id: c.id,
            ambassador_id: c.ambassador_id,
            sponsor_id: c.sponsor_id,
            buyer_user_id: c.buyer_user_id,
            affiliate_program_id: c.affiliate_program_id,
            sale_type: c.sale_type.as_str().to_string(),
            order_ref: c.order_ref,
            amount: c.amount.to_money_string(),
            commission_total: c.commission_total.to_money_string(),
            ambassador_share: c.shares.ambassador.to_money_string(),
            sponsor_share: c.shares.sponsor.to_money_string(),
            buyer_share: c.shares.buyer.to_money_string(),
            platform_share: c.shares.platform.to_money_string(),
            applied_ambassador_rate: c.rates.ambassador.to_canonical_string(),
            applied_sponsor_rate: c.rates.sponsor.to_canonical_string(),
            applied_buyer_rate: c.rates.buyer.to_canonical_string(),
            applied_platform_rate: c.rates.platform.to_canonical_string(),
            status: c.status.as_str().to_string(),
            created_at: c.created_at.as_ms(),
            confirmed_at: c.confirmed_at.map(|t| t.as_ms()),
            paid_at: c.paid_at.map(|t| t.as_ms()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversionResponse {
    pub conversion: ConversionDto,
    pub first_sale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_up: Option<TierUp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashback: Option<CashbackCredit>,
}

pub async fn create_conversion(
    State(state): State<AppState>,
    Json(params): Json<ConversionParams>,
) -> Result<(StatusCode, Json<CreateConversionResponse>), AppError> {
    if !params.amount.is_positive() {
        return Err(AppError::BadRequest("amount must be positive".into()));
    }
    if params.commission_total.is_some_and(|t| t.is_negative()) {
        return Err(AppError::BadRequest("commissionTotal must not be negative".into()));
    }

    match state.conversions.record_once(params).await? {
        Recorded::Created(outcome) => Ok((
            StatusCode::CREATED,
            Json(CreateConversionResponse {
                conversion: outcome.conversion.into(),
                first_sale: outcome.first_sale,
                tier_up: outcome.tier_up,
                cashback: outcome.cashback,
            }),
        )),
        Recorded::Duplicate(existing) => Err(AppError::Conflict(format!(
            "order already recorded as conversion {}",
            existing.id
        ))),
    }
}

pub async fn get_conversion(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ConversionDto>, AppError> {
    let conversion = state
        .repo
        .get_conversion(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("conversion {}", id)))?;
    Ok(Json(conversion.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub actor_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn confirm_conversion(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ConversionDto>, AppError> {
    let conversion = state.lifecycle.confirm_conversion(id, req.actor_id).await?;
    Ok(Json(conversion.into()))
}

pub async fn pay_conversion(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ConversionDto>, AppError> {
    let conversion = state.lifecycle.pay_conversion(id, req.actor_id).await?;
    Ok(Json(conversion.into()))
}

pub async fn cancel_conversion(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ConversionDto>, AppError> {
    let conversion = state
        .lifecycle
        .cancel_conversion(id, req.actor_id, req.reason)
        .await?;
    Ok(Json(conversion.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub actor_id: Uuid,
    pub conversion_ids: Vec<Uuid>,
}

pub async fn create_payout(
    State(state): State<AppState>,
    Json(req): Json<PayoutRequest>,
) -> Result<(StatusCode, Json<Payout>), AppError> {
    let payout = state
        .lifecycle
        .pay_batch(&req.conversion_ids, req.actor_id)
        .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}
