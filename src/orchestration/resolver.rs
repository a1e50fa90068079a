//! Loads the inputs of the rate cascade and runs it.

use crate::db::repo::{catalog, users};
use crate::db::Repository;
use crate::domain::{AffiliateProgram, CommissionTier, Decimal, SaleType, Shares, TimeMs, User};
use crate::engine::{
    calculate_shares, resolve_rates, select_tier, BoostOverlay, BuyerRateOverrides, RateInputs,
    ResolvedRates,
};
use crate::error::LedgerError;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Everything a rate lookup read, kept for callers that write afterwards.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub ambassador: User,
    /// Full tier table, ascending by `min_sales`.
    pub tiers: Vec<CommissionTier>,
    pub program: Option<AffiliateProgram>,
    pub rates: ResolvedRates,
}

/// A rate lookup request.
#[derive(Debug, Clone, Copy)]
pub struct RateQuery {
    pub ambassador_id: Uuid,
    pub program_id: Uuid,
    pub sale_type: SaleType,
    pub overrides: BuyerRateOverrides,
}

#[derive(Debug, Clone)]
pub struct RateResolver {
    repo: Arc<Repository>,
    default_buyer_rate: Decimal,
}

impl RateResolver {
    pub fn new(repo: Arc<Repository>, default_buyer_rate: Decimal) -> Self {
        Self {
            repo,
            default_buyer_rate,
        }
    }

    pub fn default_buyer_rate(&self) -> Decimal {
        self.default_buyer_rate
    }

    /// Resolve the three rates on a pooled connection.
    ///
    /// # Errors
    /// `NotFound` for an unknown ambassador, `NoTierFound` when the tier
    /// table has no row at or below the ambassador's sales count.
    pub async fn resolve_rates(&self, query: &RateQuery) -> Result<ResolvedRates, LedgerError> {
        let mut conn = self.repo.pool().acquire().await?;
        let resolution = self.resolve_in(&mut conn, query, TimeMs::now()).await?;
        Ok(resolution.rates)
    }

    /// Resolve on a caller-owned connection, usually inside a transaction
    /// that already holds the ambassador's lock.
    pub async fn resolve_in(
        &self,
        conn: &mut SqliteConnection,
        query: &RateQuery,
        now: TimeMs,
    ) -> Result<Resolution, LedgerError> {
        let ambassador = users::fetch_user(conn, query.ambassador_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("ambassador", query.ambassador_id))?;

        let tiers = catalog::load_tiers(conn).await?;
        let tier = select_tier(&tiers, ambassador.total_sales)
            .ok_or(LedgerError::NoTierFound(ambassador.total_sales))?;

        let candidates = catalog::load_candidate_boosts(conn, ambassador.id, now).await?;
        let boosts = BoostOverlay::build(&candidates, ambassador.id, now);

        let program = catalog::fetch_program(conn, query.program_id).await?;
        if program.is_none() {
            debug!(program_id = %query.program_id, "Program not found; using default buyer rate");
        }

        let rates = resolve_rates(&RateInputs {
            ambassador: &ambassador,
            tier,
            boosts: &boosts,
            sale_type: query.sale_type,
            overrides: query.overrides,
            program: program.as_ref(),
            default_buyer_rate: self.default_buyer_rate,
        });

        Ok(Resolution {
            ambassador,
            tiers,
            program,
            rates,
        })
    }

    /// Split `commission_total` using already resolved rates.
    pub fn calculate_shares(
        rates: &ResolvedRates,
        commission_total: Decimal,
    ) -> Result<Shares, LedgerError> {
        calculate_shares(
            rates.ambassador.value,
            rates.sponsor.value,
            rates.buyer.value,
            commission_total,
        )
    }
}
