//! Rate cascade: tier defaults, boost overrides and buyer-rate fallbacks.
//!
//! Everything here is pure. `orchestration::resolver` loads the inputs and
//! calls `resolve_rates`.

use crate::domain::{
    AffiliateProgram, BoostDimension, CommissionBoost, CommissionTier, Decimal, SaleType, TimeMs,
    User,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "boostId", rename_all = "snake_case")]
pub enum RateSource {
    Tier,
    Boost(Uuid),
    ProductOverride,
    CategoryOverride,
    Program,
    GlobalDefault,
    NoSponsor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub value: Decimal,
    pub source: RateSource,
}

impl ResolvedRate {
    fn new(value: Decimal, source: RateSource) -> Self {
        ResolvedRate { value, source }
    }

    pub fn boost_id(&self) -> Option<Uuid> {
        match self.source {
            RateSource::Boost(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRates {
    pub ambassador: ResolvedRate,
    pub sponsor: ResolvedRate,
    pub buyer: ResolvedRate,
    /// Tier the ambassador rate defaults were taken from.
    pub tier: String,
}

impl ResolvedRates {
    /// Boosts that supplied at least one of the three rates.
    pub fn applied_boosts(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = [self.ambassador, self.sponsor, self.buyer]
            .iter()
            .filter_map(|r| r.boost_id())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Caller-supplied buyer rates that outrank the program default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerRateOverrides {
    pub product_rate: Option<Decimal>,
    /// Only honoured for dropship sales.
    pub category_rate: Option<Decimal>,
}

/// Pick the tier with the greatest `min_sales` not above `total_sales`.
pub fn select_tier(tiers: &[CommissionTier], total_sales: i64) -> Option<&CommissionTier> {
    tiers
        .iter()
        .filter(|t| t.min_sales <= total_sales)
        .max_by_key(|t| t.min_sales)
}

/// First eligible boost per dimension.
///
/// User-scoped boosts are visited before global ones, so a personal boost
/// always wins regardless of value or creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoostOverlay {
    overrides: BTreeMap<BoostDimension, (Decimal, Uuid)>,
}

impl BoostOverlay {
    pub fn build(boosts: &[CommissionBoost], ambassador: Uuid, now: TimeMs) -> Self {
        let mut eligible: Vec<&CommissionBoost> = boosts
            .iter()
            .filter(|b| b.is_eligible(ambassador, now))
            .collect();
        // Stable: keeps creation order within each scope.
        eligible.sort_by_key(|b| (b.is_global(), b.created_at));

        let mut overrides = BTreeMap::new();
        for boost in eligible {
            overrides
                .entry(boost.dimension)
                .or_insert((boost.value, boost.id));
        }
        BoostOverlay { overrides }
    }

    pub fn get(&self, dimension: BoostDimension) -> Option<ResolvedRate> {
        self.overrides
            .get(&dimension)
            .map(|(value, id)| ResolvedRate::new(*value, RateSource::Boost(*id)))
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Everything the cascade needs, already loaded.
#[derive(Debug)]
pub struct RateInputs<'a> {
    pub ambassador: &'a User,
    pub tier: &'a CommissionTier,
    pub boosts: &'a BoostOverlay,
    pub sale_type: SaleType,
    pub overrides: BuyerRateOverrides,
    /// `None` when the program could not be loaded.
    pub program: Option<&'a AffiliateProgram>,
    pub default_buyer_rate: Decimal,
}

pub fn resolve_rates(inputs: &RateInputs<'_>) -> ResolvedRates {
    let ambassador = inputs
        .boosts
        .get(BoostDimension::AmbassadorRate)
        .unwrap_or_else(|| {
            ResolvedRate::new(inputs.tier.ambassador_rate(inputs.sale_type), RateSource::Tier)
        });

    let sponsor = if !inputs.ambassador.has_sponsor() {
        ResolvedRate::new(Decimal::zero(), RateSource::NoSponsor)
    } else {
        inputs
            .boosts
            .get(BoostDimension::SponsorRate)
            .unwrap_or_else(|| ResolvedRate::new(inputs.tier.sponsor_rate, RateSource::Tier))
    };

    let buyer = resolve_buyer_rate(inputs);

    ResolvedRates {
        ambassador,
        sponsor,
        buyer,
        tier: inputs.tier.name.clone(),
    }
}

fn resolve_buyer_rate(inputs: &RateInputs<'_>) -> ResolvedRate {
    if let Some(boosted) = inputs.boosts.get(BoostDimension::BuyerCashback) {
        return boosted;
    }
    if let Some(rate) = inputs.overrides.product_rate {
        return ResolvedRate::new(rate, RateSource::ProductOverride);
    }
    if inputs.sale_type == SaleType::Dropship {
        if let Some(rate) = inputs.overrides.category_rate {
            return ResolvedRate::new(rate, RateSource::CategoryOverride);
        }
    }
    match inputs.program {
        Some(program) => ResolvedRate::new(program.buyer_cashback_rate, RateSource::Program),
        None => ResolvedRate::new(inputs.default_buyer_rate, RateSource::GlobalDefault),
    }
}
