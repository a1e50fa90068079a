//! Turns resolved rates into cent-exact shares.

use crate::domain::{AppliedRates, Decimal, Shares};
use crate::error::LedgerError;
use tracing::error;

/// Split `commission_total` by the three percentages.
///
/// Each named share is rounded to cents; the platform keeps the exact
/// remainder, so the four always sum to `commission_total`.
///
/// # Errors
/// `DistributionExceeded` when the named shares add up to more than the total,
/// `InvalidAmount` when the arithmetic overflows.
pub fn calculate_shares(
    ambassador_rate: Decimal,
    sponsor_rate: Decimal,
    buyer_rate: Decimal,
    commission_total: Decimal,
) -> Result<Shares, LedgerError> {
    let overflow = || {
        error!(
            commission_total = %commission_total,
            ambassador_rate = %ambassador_rate,
            sponsor_rate = %sponsor_rate,
            buyer_rate = %buyer_rate,
            "Commission split overflowed"
        );
        LedgerError::InvalidAmount {
            amount: commission_total,
        }
    };
    let ambassador = commission_total.percent(ambassador_rate).ok_or_else(overflow)?;
    let sponsor = commission_total.percent(sponsor_rate).ok_or_else(overflow)?;
    let buyer = commission_total.percent(buyer_rate).ok_or_else(overflow)?;
    let distributed = ambassador
        .checked_add(sponsor)
        .and_then(|v| v.checked_add(buyer))
        .ok_or_else(overflow)?;
    let platform = commission_total
        .checked_sub(distributed)
        .ok_or_else(overflow)?;

    if platform.is_negative() {
        error!(
            commission_total = %commission_total,
            distributed = %distributed,
            ambassador_rate = %ambassador_rate,
            sponsor_rate = %sponsor_rate,
            buyer_rate = %buyer_rate,
            "Commission distribution exceeds total; check tier and boost configuration"
        );
        return Err(LedgerError::DistributionExceeded {
            commission_total,
            distributed,
        });
    }

    Ok(Shares {
        ambassador,
        sponsor,
        buyer,
        platform,
    })
}

/// The rate snapshot stored with a conversion. Platform rate is the remainder.
pub fn applied_rates(ambassador: Decimal, sponsor: Decimal, buyer: Decimal) -> AppliedRates {
    AppliedRates {
        ambassador,
        sponsor,
        buyer,
        platform: Decimal::hundred() - ambassador - sponsor - buyer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_reference_split() {
        let shares = calculate_shares(d("25"), d("10"), d("10"), d("20")).unwrap();
        assert_eq!(shares.ambassador, d("5.00"));
        assert_eq!(shares.sponsor, d("2.00"));
        assert_eq!(shares.buyer, d("2.00"));
        assert_eq!(shares.platform, d("11.00"));
    }

    #[test]
    fn test_shares_always_sum_to_total() {
        let totals = ["0", "0.01", "0.07", "1", "3.33", "19.99", "100", "12345.67"];
        let rates = ["0", "1", "7.5", "12.345", "25", "33.333", "40"];
        for total in totals {
            for a in rates {
                for s in rates {
                    for b in ["0", "2.5", "10", "19.9"] {
                        let total = d(total);
                        match calculate_shares(d(a), d(s), d(b), total) {
                            Ok(shares) => {
                                assert_eq!(shares.total(), total);
                                assert!(!shares.platform.is_negative());
                            }
                            Err(LedgerError::DistributionExceeded { .. }) => {}
                            Err(other) => panic!("unexpected error {other}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_over_distribution_rejected() {
        let result = calculate_shares(d("60"), d("30"), d("20"), d("20"));
        match result {
            Err(LedgerError::DistributionExceeded {
                commission_total,
                distributed,
            }) => {
                assert_eq!(commission_total, d("20"));
                assert_eq!(distributed, d("22"));
            }
            other => panic!("Expected DistributionExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_overflowing_total_is_an_error() {
        let total = d("79228162514264337593543950335");
        let result = calculate_shares(d("25"), d("10"), d("10"), total);
        assert!(matches!(result, Err(LedgerError::InvalidAmount { amount }) if amount == total));
    }

    #[test]
    fn test_exactly_full_distribution_is_allowed() {
        let shares = calculate_shares(d("50"), d("30"), d("20"), d("10")).unwrap();
        assert!(shares.platform.is_zero());
    }

    #[test]
    fn test_half_cent_rounds_up() {
        // 0.10 * 5% = 0.005 -> 0.01
        let shares = calculate_shares(d("5"), d("0"), d("0"), d("0.10")).unwrap();
        assert_eq!(shares.ambassador, d("0.01"));
        assert_eq!(shares.platform, d("0.09"));
    }

    #[test]
    fn test_applied_platform_rate_is_remainder() {
        let rates = applied_rates(d("25"), d("10"), d("10"));
        assert_eq!(rates.platform, d("55"));
    }
}
