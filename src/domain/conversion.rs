//! Conversion: the ledger entry for one attributed sale.

use super::{Decimal, SaleType, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Settlement status. `Paid` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Confirmed => "confirmed",
            ConversionStatus::Paid => "paid",
            ConversionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStatus::Paid | ConversionStatus::Cancelled)
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ConversionStatus::Pending),
            "confirmed" => Ok(ConversionStatus::Confirmed),
            "paid" => Ok(ConversionStatus::Paid),
            "cancelled" => Ok(ConversionStatus::Cancelled),
            other => Err(format!("unknown conversion status: {}", other)),
        }
    }
}

/// The four-way split of a commission total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shares {
    pub ambassador: Decimal,
    pub sponsor: Decimal,
    pub buyer: Decimal,
    pub platform: Decimal,
}

impl Shares {
    pub fn total(&self) -> Decimal {
        self.ambassador + self.sponsor + self.buyer + self.platform
    }
}

/// The rates a conversion was computed with, snapshotted at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRates {
    pub ambassador: Decimal,
    pub sponsor: Decimal,
    pub buyer: Decimal,
    /// Whatever percentage of the commission the platform kept.
    pub platform: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: Uuid,
    pub ambassador_id: Uuid,
    /// Ambassador's sponsor at creation time. Never re-derived.
    pub sponsor_id: Option<Uuid>,
    pub buyer_user_id: Option<Uuid>,
    pub affiliate_program_id: Uuid,
    pub sale_type: SaleType,
    pub order_ref: Option<String>,
    pub amount: Decimal,
    pub commission_total: Decimal,
    pub shares: Shares,
    pub rates: AppliedRates,
    pub status: ConversionStatus,
    pub created_at: TimeMs,
    pub confirmed_at: Option<TimeMs>,
    pub paid_at: Option<TimeMs>,
}

impl Conversion {
    /// Whether cancelling this conversion owes a cashback reversal.
    pub fn has_buyer_credit(&self) -> bool {
        self.buyer_user_id.is_some() && self.shares.buyer.is_positive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_through_str() {
        for status in [
            ConversionStatus::Pending,
            ConversionStatus::Confirmed,
            ConversionStatus::Paid,
            ConversionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ConversionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ConversionStatus::Paid.is_terminal());
        assert!(ConversionStatus::Cancelled.is_terminal());
        assert!(!ConversionStatus::Confirmed.is_terminal());
    }
}
