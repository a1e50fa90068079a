//! The conversion write path.
//!
//! One transaction covers rate resolution, the conversion row, the buyer's
//! cashback credit, boost usage and the ambassador's sales counter. Side
//! effects are published on the event bus only after commit.

use crate::db::repo::{catalog, conversions, users};
use crate::db::Repository;
use crate::domain::{
    CashbackType, CommissionTier, Conversion, ConversionStatus, Decimal, SaleType, TimeMs, User,
};
use crate::engine::{applied_rates, select_tier, BuyerRateOverrides};
use crate::error::LedgerError;
use crate::events::{CashbackCredit, EventBus, LedgerEvent, TierUp};
use crate::orchestration::cashback;
use crate::orchestration::resolver::{RateQuery, RateResolver};
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input for one recorded sale.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionParams {
    pub ambassador_id: Uuid,
    pub affiliate_program_id: Uuid,
    #[serde(default)]
    pub buyer_user_id: Option<Uuid>,
    pub sale_type: SaleType,
    pub amount: Decimal,
    /// Derived from the program's average rate when absent.
    #[serde(default)]
    pub commission_total: Option<Decimal>,
    #[serde(default)]
    pub order_ref: Option<String>,
    #[serde(default)]
    pub overrides: BuyerRateOverrides,
}

/// A committed conversion plus what the post-commit triggers need.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub conversion: Conversion,
    pub first_sale: bool,
    pub tier_up: Option<TierUp>,
    pub cashback: Option<CashbackCredit>,
}

/// Result of [`ConversionOrchestrator::record_once`].
#[derive(Debug, Clone)]
pub enum Recorded {
    Created(ConversionOutcome),
    /// The `(order_ref, program)` pair was already recorded.
    Duplicate(Conversion),
}

#[derive(Clone)]
pub struct ConversionOrchestrator {
    repo: Arc<Repository>,
    resolver: RateResolver,
    bus: Arc<EventBus>,
}

impl ConversionOrchestrator {
    pub fn new(repo: Arc<Repository>, resolver: RateResolver, bus: Arc<EventBus>) -> Self {
        Self {
            repo,
            resolver,
            bus,
        }
    }

    /// Create a conversion atomically.
    ///
    /// Performs no `order_ref` pre-check; a repeated order fails on the unique
    /// index with `DuplicateOrder`. Use [`Self::record_once`] for replayable
    /// inputs.
    ///
    /// # Errors
    /// `NotFound` (ambassador, buyer, or the program when a commission total
    /// must be derived), `NoTierFound`, `DistributionExceeded`,
    /// `DuplicateOrder`, `InvalidAmount` for an amount or commission total
    /// outside the money range. Nothing is written on error.
    pub async fn create_conversion(
        &self,
        params: ConversionParams,
    ) -> Result<ConversionOutcome, LedgerError> {
        for amount in std::iter::once(params.amount).chain(params.commission_total) {
            if !amount.is_within_money_range() {
                return Err(LedgerError::InvalidAmount { amount });
            }
        }

        let now = TimeMs::now();
        let mut tx = self.repo.begin().await?;

        if !users::lock_user(&mut *tx, params.ambassador_id).await? {
            return Err(LedgerError::not_found("ambassador", params.ambassador_id));
        }

        let query = RateQuery {
            ambassador_id: params.ambassador_id,
            program_id: params.affiliate_program_id,
            sale_type: params.sale_type,
            overrides: params.overrides,
        };
        let resolution = self.resolver.resolve_in(&mut *tx, &query, now).await?;
        let rates = &resolution.rates;

        let commission_total = match params.commission_total {
            Some(total) => total,
            None => resolution
                .program
                .as_ref()
                .ok_or_else(|| {
                    LedgerError::not_found("affiliate program", params.affiliate_program_id)
                })?
                .derive_commission(params.amount)
                .ok_or(LedgerError::InvalidAmount {
                    amount: params.amount,
                })?,
        };

        let shares = RateResolver::calculate_shares(rates, commission_total)?;
        let ambassador = &resolution.ambassador;

        let conversion = Conversion {
            id: Uuid::new_v4(),
            ambassador_id: ambassador.id,
            sponsor_id: ambassador.referred_by,
            buyer_user_id: params.buyer_user_id,
            affiliate_program_id: params.affiliate_program_id,
            sale_type: params.sale_type,
            order_ref: params.order_ref.clone(),
            amount: params.amount,
            commission_total,
            shares,
            rates: applied_rates(rates.ambassador.value, rates.sponsor.value, rates.buyer.value),
            status: ConversionStatus::Pending,
            created_at: now,
            confirmed_at: None,
            paid_at: None,
        };

        // Buyer is checked before the insert so a missing buyer reads as
        // NotFound rather than a foreign key failure.
        let buyer = match conversion.buyer_user_id {
            Some(buyer_id) => Some(cashback::lock_and_fetch(&mut *tx, buyer_id, "buyer").await?),
            None => None,
        };

        conversions::insert_conversion(&mut *tx, &conversion)
            .await
            .map_err(|e| duplicate_or_db(e, params.order_ref.as_deref()))?;

        let cashback = match buyer {
            Some(buyer) if conversion.has_buyer_credit() => {
                Some(credit_buyer(&mut *tx, &buyer, &conversion, now).await?)
            }
            _ => None,
        };

        catalog::increment_boost_uses(&mut *tx, &rates.applied_boosts()).await?;

        let total_sales = ambassador.total_sales + 1;
        let tier_up = advance_tier(
            &mut *tx,
            ambassador,
            &resolution.tiers,
            total_sales,
            params.sale_type,
        )
        .await?;

        tx.commit().await?;

        info!(
            conversion_id = %conversion.id,
            ambassador_id = %conversion.ambassador_id,
            commission_total = %conversion.commission_total,
            ambassador_share = %conversion.shares.ambassador,
            sponsor_share = %conversion.shares.sponsor,
            buyer_share = %conversion.shares.buyer,
            platform_share = %conversion.shares.platform,
            tier = %rates.tier,
            "Conversion recorded"
        );

        let outcome = ConversionOutcome {
            first_sale: total_sales == 1,
            tier_up,
            cashback,
            conversion,
        };

        self.bus.publish(LedgerEvent::ConversionCreated {
            conversion_id: outcome.conversion.id,
            ambassador_id: outcome.conversion.ambassador_id,
            first_sale: outcome.first_sale,
            tier_up: outcome.tier_up.clone(),
            cashback: outcome.cashback.clone(),
        });

        Ok(outcome)
    }

    /// Create a conversion unless `(order_ref, program)` is already recorded.
    ///
    /// Inputs without an `order_ref` are always created.
    pub async fn record_once(&self, params: ConversionParams) -> Result<Recorded, LedgerError> {
        let Some(order_ref) = params.order_ref.clone() else {
            return self.create_conversion(params).await.map(Recorded::Created);
        };
        let program_id = params.affiliate_program_id;

        if let Some(existing) = self
            .repo
            .find_conversion_by_order_ref(&order_ref, program_id)
            .await?
        {
            return Ok(Recorded::Duplicate(existing));
        }

        match self.create_conversion(params).await {
            Ok(outcome) => Ok(Recorded::Created(outcome)),
            // Lost the race to a concurrent insert of the same order.
            Err(LedgerError::DuplicateOrder { .. }) => self
                .repo
                .find_conversion_by_order_ref(&order_ref, program_id)
                .await?
                .map(Recorded::Duplicate)
                .ok_or(LedgerError::DuplicateOrder { order_ref }),
            Err(e) => Err(e),
        }
    }
}

fn duplicate_or_db(err: sqlx::Error, order_ref: Option<&str>) -> LedgerError {
    let unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    match order_ref {
        Some(order_ref) if unique => LedgerError::DuplicateOrder {
            order_ref: order_ref.to_string(),
        },
        _ => LedgerError::Db(err),
    }
}

/// Credit the buyer's share. The caller must hold the buyer's lock.
async fn credit_buyer(
    conn: &mut SqliteConnection,
    buyer: &User,
    conversion: &Conversion,
    now: TimeMs,
) -> Result<CashbackCredit, sqlx::Error> {
    let entry = cashback::post_entry(
        conn,
        buyer,
        CashbackType::Earned,
        conversion.shares.buyer,
        Some(conversion.id),
        None,
        now,
    )
    .await?;

    Ok(CashbackCredit {
        buyer_id: buyer.id,
        amount: entry.amount,
        balance_after: entry.balance_after,
    })
}

/// Store the new sales count and re-resolve the tier. Returns a tier-up only
/// when the ambassador moved to a higher bracket, quoting the new tier's rate
/// for `sale_type`.
async fn advance_tier(
    conn: &mut SqliteConnection,
    ambassador: &User,
    tiers: &[CommissionTier],
    total_sales: i64,
    sale_type: SaleType,
) -> Result<Option<TierUp>, LedgerError> {
    let new_tier = select_tier(tiers, total_sales).ok_or(LedgerError::NoTierFound(total_sales))?;
    users::update_sales_and_tier(conn, ambassador.id, total_sales, &new_tier.name).await?;

    if new_tier.name == ambassador.tier {
        return Ok(None);
    }

    // An unset or retired stored tier compares against the bracket the old
    // sales count selects.
    let previous_min = tiers
        .iter()
        .find(|t| t.name == ambassador.tier)
        .or_else(|| select_tier(tiers, ambassador.total_sales))
        .map(|t| t.min_sales);

    match previous_min {
        Some(min) if new_tier.min_sales < min => {
            warn!(
                ambassador_id = %ambassador.id,
                from = %ambassador.tier,
                to = %new_tier.name,
                "Tier moved down; not reporting a tier-up"
            );
            Ok(None)
        }
        Some(min) if new_tier.min_sales == min => Ok(None),
        _ => Ok(Some(TierUp {
            previous: ambassador.tier.clone(),
            tier: new_tier.name.clone(),
            ambassador_rate: new_tier.ambassador_rate(sale_type),
        })),
    }
}
