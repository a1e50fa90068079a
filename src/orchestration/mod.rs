//! Services that own a transaction or a side effect.
//!
//! - `resolver` loads rate inputs and runs the cascade
//! - `conversion` is the atomic conversion write path
//! - `lifecycle` moves conversions through settlement
//! - `cashback` handles withdrawals and adjustments of buyer balances
//! - `fraud` runs the post-commit heuristics

pub mod cashback;
pub mod conversion;
pub mod fraud;
pub mod lifecycle;
pub mod resolver;

pub use cashback::{BalanceCheck, CashbackLedger};
pub use conversion::{ConversionOrchestrator, ConversionOutcome, ConversionParams, Recorded};
pub use fraud::{FlagReview, FraudScanner};
pub use lifecycle::{LifecycleEngine, Payout};
pub use resolver::{RateQuery, RateResolver, Resolution};
