//! Cashback ledger rows. One row per balance change, never updated.

use super::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashbackType {
    Earned,
    Withdrawal,
    Clawback,
    Adjustment,
}

impl CashbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashbackType::Earned => "earned",
            CashbackType::Withdrawal => "withdrawal",
            CashbackType::Clawback => "clawback",
            CashbackType::Adjustment => "adjustment",
        }
    }
}

impl FromStr for CashbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(CashbackType::Earned),
            "withdrawal" => Ok(CashbackType::Withdrawal),
            "clawback" => Ok(CashbackType::Clawback),
            "adjustment" => Ok(CashbackType::Adjustment),
            other => Err(format!("unknown cashback type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversion_id: Option<Uuid>,
    pub kind: CashbackType,
    /// Signed: credits positive, debits negative.
    pub amount: Decimal,
    /// Balance immediately after this row was applied, captured under lock.
    pub balance_after: Decimal,
    pub note: Option<String>,
    pub created_at: TimeMs,
}
