//! Domain types for the commission ledger.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Users, tiers, boosts and programs that feed rate resolution
//! - Conversions, cashback ledger rows and fraud flags

pub mod boost;
pub mod cashback;
pub mod conversion;
pub mod decimal;
pub mod fraud;
pub mod primitives;
pub mod tier;
pub mod user;

pub use boost::{BoostDimension, CommissionBoost};
pub use cashback::{CashbackTransaction, CashbackType};
pub use conversion::{AppliedRates, Conversion, ConversionStatus, Shares};
pub use decimal::Decimal;
pub use fraud::{FlagStatus, FraudFlag, FraudType, Severity};
pub use primitives::{SaleType, TimeMs};
pub use tier::{AffiliateProgram, CommissionTier};
pub use user::{Role, User};
