//! Pure computation for the commission ledger: no I/O, no clocks.

pub mod fraud;
pub mod lifecycle;
pub mod rates;
pub mod shares;

pub use fraud::{FraudThresholds, Finding};
pub use lifecycle::Transition;
pub use rates::{
    resolve_rates, select_tier, BoostOverlay, BuyerRateOverrides, RateInputs, RateSource,
    ResolvedRate, ResolvedRates,
};
pub use shares::{applied_rates, calculate_shares};
