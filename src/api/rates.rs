use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::{Decimal, SaleType, Shares};
use crate::engine::{BuyerRateOverrides, ResolvedRates};
use crate::error::AppError;
use crate::orchestration::{RateQuery, RateResolver};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRatesRequest {
    pub ambassador_id: Uuid,
    pub affiliate_program_id: Uuid,
    pub sale_type: SaleType,
    #[serde(default)]
    pub overrides: BuyerRateOverrides,
    /// When given, the response also carries the share split.
    #[serde(default)]
    pub commission_total: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRatesResponse {
    pub rates: ResolvedRates,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<Shares>,
}

pub async fn resolve_rates(
    State(state): State<AppState>,
    Json(req): Json<ResolveRatesRequest>,
) -> Result<Json<ResolveRatesResponse>, AppError> {
    let rates = state
        .resolver
        .resolve_rates(&RateQuery {
            ambassador_id: req.ambassador_id,
            program_id: req.affiliate_program_id,
            sale_type: req.sale_type,
            overrides: req.overrides,
        })
        .await?;

    let shares = req
        .commission_total
        .map(|total| RateResolver::calculate_shares(&rates, total))
        .transpose()?;

    Ok(Json(ResolveRatesResponse { rates, shares }))
}
