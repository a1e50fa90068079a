//! Time-windowed rate overrides.

use super::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The rate a boost overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostDimension {
    AmbassadorRate,
    BuyerCashback,
    SponsorRate,
}

impl BoostDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostDimension::AmbassadorRate => "ambassador_rate",
            BoostDimension::BuyerCashback => "buyer_cashback",
            BoostDimension::SponsorRate => "sponsor_rate",
        }
    }
}

impl fmt::Display for BoostDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoostDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ambassador_rate" => Ok(BoostDimension::AmbassadorRate),
            "buyer_cashback" => Ok(BoostDimension::BuyerCashback),
            "sponsor_rate" => Ok(BoostDimension::SponsorRate),
            other => Err(format!("unknown boost dimension: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBoost {
    pub id: Uuid,
    pub dimension: BoostDimension,
    /// Replacement rate, in percent.
    pub value: Decimal,
    /// `None` means the boost applies to every ambassador.
    pub user_id: Option<Uuid>,
    pub active: bool,
    pub start_ms: TimeMs,
    /// `None` means open-ended.
    pub end_ms: Option<TimeMs>,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub created_at: TimeMs,
}

impl CommissionBoost {
    /// A global boost, active from `start_ms` with no end or usage cap.
    pub fn global(dimension: BoostDimension, value: Decimal, start_ms: TimeMs) -> Self {
        CommissionBoost {
            id: Uuid::new_v4(),
            dimension,
            value,
            user_id: None,
            active: true,
            start_ms,
            end_ms: None,
            max_uses: None,
            current_uses: 0,
            created_at: start_ms,
        }
    }

    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn ending_at(mut self, end_ms: TimeMs) -> Self {
        self.end_ms = Some(end_ms);
        self
    }

    pub fn with_max_uses(mut self, max_uses: i64) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn is_global(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_uses, Some(max) if self.current_uses >= max)
    }

    /// Whether the boost may supply a rate for `ambassador` at `now`.
    pub fn is_eligible(&self, ambassador: Uuid, now: TimeMs) -> bool {
        self.active
            && self.start_ms <= now
            && self.end_ms.map_or(true, |end| now <= end)
            && !self.is_exhausted()
            && self.user_id.map_or(true, |uid| uid == ambassador)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boost() -> CommissionBoost {
        CommissionBoost::global(
            BoostDimension::AmbassadorRate,
            Decimal::from_i64(40),
            TimeMs::new(1_000),
        )
    }

    #[test]
    fn test_eligible_inside_window() {
        let b = boost().ending_at(TimeMs::new(2_000));
        let amb = Uuid::new_v4();
        assert!(b.is_eligible(amb, TimeMs::new(1_000)));
        assert!(b.is_eligible(amb, TimeMs::new(2_000)));
        assert!(!b.is_eligible(amb, TimeMs::new(999)));
        assert!(!b.is_eligible(amb, TimeMs::new(2_001)));
    }

    #[test]
    fn test_inactive_and_exhausted_are_ineligible() {
        let amb = Uuid::new_v4();
        let mut inactive = boost();
        inactive.active = false;
        assert!(!inactive.is_eligible(amb, TimeMs::new(1_500)));

        let mut used = boost().with_max_uses(2);
        used.current_uses = 2;
        assert!(used.is_exhausted());
        assert!(!used.is_eligible(amb, TimeMs::new(1_500)));
    }

    #[test]
    fn test_user_scope() {
        let amb = Uuid::new_v4();
        let other = Uuid::new_v4();
        let b = boost().for_user(amb);
        assert!(b.is_eligible(amb, TimeMs::new(1_500)));
        assert!(!b.is_eligible(other, TimeMs::new(1_500)));
    }
}
