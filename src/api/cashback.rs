use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::{CashbackTransaction, Decimal};
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashbackTransactionDto {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: String,
    pub balance_after: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: i64,
}

impl From<CashbackTransaction> for CashbackTransactionDto {
    fn from(t: CashbackTransaction) -> Self {
        CashbackTransactionDto {
            id: t.id,
            conversion_id: t.conversion_id,
            kind: t.kind.as_str().to_string(),
            amount: t.amount.to_money_string(),
            balance_after: t.balance_after.to_money_string(),
            note: t.note,
            created_at: t.created_at.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashbackResponse {
    pub user_id: Uuid,
    pub balance: String,
    pub transaction_count: usize,
    pub transactions: Vec<CashbackTransactionDto>,
}

pub async fn get_cashback(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<CashbackResponse>, AppError> {
    let transactions = state.cashback.balance_history(user_id).await?;
    let balance = state.cashback.balance(user_id).await?;

    Ok(Json(CashbackResponse {
        user_id,
        balance: balance.to_money_string(),
        transaction_count: transactions.len(),
        transactions: transactions.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn withdraw(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<CashbackTransactionDto>, AppError> {
    let entry = state
        .cashback
        .withdraw(user_id, req.amount, req.note)
        .await?;
    Ok(Json(entry.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub actor_id: Uuid,
    /// Signed; negative debits the balance.
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn adjust(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<CashbackTransactionDto>, AppError> {
    let entry = state
        .cashback
        .adjust(user_id, req.amount, req.actor_id, req.note)
        .await?;
    Ok(Json(entry.into()))
}
