//! Fraud heuristics. Each check is independent and side-effect free.

use crate::domain::{Conversion, FraudType, User};
use serde_json::json;

/// Limits for the volume-based checks. A check fires when the count is
/// strictly greater than its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FraudThresholds {
    pub click_spam_threshold: i64,
    pub click_spam_window_ms: i64,
    pub rapid_conversion_threshold: i64,
    pub rapid_conversion_window_ms: i64,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        FraudThresholds {
            click_spam_threshold: 50,
            click_spam_window_ms: 60 * 60 * 1000,
            rapid_conversion_threshold: 20,
            rapid_conversion_window_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// A triggered heuristic, ready to become a flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub kind: FraudType,
    pub details: serde_json::Value,
}

pub fn check_self_buy(conversion: &Conversion) -> Option<Finding> {
    match conversion.buyer_user_id {
        Some(buyer) if buyer == conversion.ambassador_id => Some(Finding {
            kind: FraudType::SelfBuy,
            details: json!({
                "conversionId": conversion.id,
                "buyerUserId": buyer,
            }),
        }),
        _ => None,
    }
}

pub fn check_self_referral(ambassador: &User) -> Option<Finding> {
    if ambassador.referred_by == Some(ambassador.id) {
        Some(Finding {
            kind: FraudType::SelfReferral,
            details: json!({ "referredBy": ambassador.id }),
        })
    } else {
        None
    }
}

pub fn check_click_spam(clicks_in_window: i64, thresholds: &FraudThresholds) -> Option<Finding> {
    (clicks_in_window > thresholds.click_spam_threshold).then(|| Finding {
        kind: FraudType::ClickSpam,
        details: json!({
            "clicks": clicks_in_window,
            "windowMs": thresholds.click_spam_window_ms,
            "threshold": thresholds.click_spam_threshold,
        }),
    })
}

pub fn check_rapid_conversion(
    conversions_in_window: i64,
    thresholds: &FraudThresholds,
) -> Option<Finding> {
    (conversions_in_window > thresholds.rapid_conversion_threshold).then(|| Finding {
        kind: FraudType::RapidConversion,
        details: json!({
            "conversions": conversions_in_window,
            "windowMs": thresholds.rapid_conversion_window_ms,
            "threshold": thresholds.rapid_conversion_threshold,
        }),
    })
}
