//! Commission tiers and the programs sales are recorded against.

use super::{Decimal, SaleType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sales-volume bracket. Rates are percentages of the commission total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub name: String,
    pub min_sales: i64,
    pub ambassador_rate_affiliate: Decimal,
    pub ambassador_rate_dropship: Decimal,
    pub sponsor_rate: Decimal,
}

impl CommissionTier {
    pub fn ambassador_rate(&self, sale_type: SaleType) -> Decimal {
        match sale_type {
            SaleType::Affiliate => self.ambassador_rate_affiliate,
            SaleType::Dropship => self.ambassador_rate_dropship,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateProgram {
    pub id: Uuid,
    pub name: String,
    /// Fallback buyer rate when no boost or override applies.
    pub buyer_cashback_rate: Decimal,
    /// Used to derive a commission total when the integration reports none.
    pub avg_commission_rate: Decimal,
}

impl AffiliateProgram {
    pub fn new(name: impl Into<String>, buyer_cashback_rate: Decimal, avg_commission_rate: Decimal) -> Self {
        AffiliateProgram {
            id: Uuid::new_v4(),
            name: name.into(),
            buyer_cashback_rate,
            avg_commission_rate,
        }
    }

    /// Commission total for a sale amount, rounded to cents. `None` on overflow.
    pub fn derive_commission(&self, amount: Decimal) -> Option<Decimal> {
        amount.percent(self.avg_commission_rate)
    }
}
