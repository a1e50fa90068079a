//! Fraud flags raised by the post-commit heuristics.

use super::TimeMs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    SelfBuy,
    ClickSpam,
    SelfReferral,
    RapidConversion,
}

impl FraudType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudType::SelfBuy => "self_buy",
            FraudType::ClickSpam => "click_spam",
            FraudType::SelfReferral => "self_referral",
            FraudType::RapidConversion => "rapid_conversion",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FraudType::SelfBuy | FraudType::SelfReferral => Severity::High,
            FraudType::ClickSpam | FraudType::RapidConversion => Severity::Medium,
        }
    }
}

impl fmt::Display for FraudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FraudType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self_buy" => Ok(FraudType::SelfBuy),
            "click_spam" => Ok(FraudType::ClickSpam),
            "self_referral" => Ok(FraudType::SelfReferral),
            "rapid_conversion" => Ok(FraudType::RapidConversion),
            other => Err(format!("unknown fraud type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical flags page an admin.
    pub fn alerts_admin(&self) -> bool {
        *self >= Severity::High
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    Pending,
    Dismissed,
    Confirmed,
}

impl FlagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagStatus::Pending => "pending",
            FlagStatus::Dismissed => "dismissed",
            FlagStatus::Confirmed => "confirmed",
        }
    }
}

impl FromStr for FlagStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FlagStatus::Pending),
            "dismissed" => Ok(FlagStatus::Dismissed),
            "confirmed" => Ok(FlagStatus::Confirmed),
            other => Err(format!("unknown flag status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudFlag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: FraudType,
    pub severity: Severity,
    pub status: FlagStatus,
    pub details: serde_json::Value,
    pub created_at: TimeMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_per_type() {
        assert_eq!(FraudType::SelfBuy.severity(), Severity::High);
        assert_eq!(FraudType::SelfReferral.severity(), Severity::High);
        assert_eq!(FraudType::ClickSpam.severity(), Severity::Medium);
        assert_eq!(FraudType::RapidConversion.severity(), Severity::Medium);
    }

    #[test]
    fn test_admin_alert_threshold() {
        assert!(Severity::Critical.alerts_admin());
        assert!(Severity::High.alerts_admin());
        assert!(!Severity::Medium.alerts_admin());
    }
}
