//! Domain primitives: TimeMs, SaleType.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// The instant `window_ms` before this one, saturating at the epoch floor.
    pub fn minus(&self, window_ms: i64) -> Self {
        TimeMs(self.0.saturating_sub(window_ms))
    }
}

/// Kind of sale a conversion records. Selects which tier rate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleType {
    Affiliate,
    Dropship,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::Affiliate => "affiliate",
            SaleType::Dropship => "dropship",
        }
    }
}

impl fmt::Display for SaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "affiliate" => Ok(SaleType::Affiliate),
            "dropship" => Ok(SaleType::Dropship),
            other => Err(format!("unknown sale type: {}", other)),
        }
    }
}
