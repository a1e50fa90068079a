//! Users: ambassadors, buyers and admins share one record.

use super::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ambassador,
    Buyer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Ambassador => "ambassador",
            Role::Buyer => "buyer",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ambassador" => Ok(Role::Ambassador),
            "buyer" => Ok(Role::Buyer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    /// Monotonic count of conversions credited to this ambassador.
    pub total_sales: i64,
    /// Name of the current commission tier.
    pub tier: String,
    /// Always equal to the signed sum of this user's cashback ledger rows.
    pub cashback_balance: Decimal,
    /// Sponsor who referred this user. Only one level is ever resolved.
    pub referred_by: Option<Uuid>,
}

impl User {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            role,
            total_sales: 0,
            tier: String::new(),
            cashback_balance: Decimal::zero(),
            referred_by: None,
        }
    }

    pub fn with_sponsor(mut self, sponsor: Uuid) -> Self {
        self.referred_by = Some(sponsor);
        self
    }

    pub fn with_total_sales(mut self, total_sales: i64) -> Self {
        self.total_sales = total_sales;
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = tier.into();
        self
    }

    pub fn has_sponsor(&self) -> bool {
        self.referred_by.is_some()
    }
}
