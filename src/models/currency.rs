use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for USD figures.
pub const USD_DECIMAL_PLACES: u32 = 2;

/// Decimal places kept for INR ledger figures.
pub const INR_DECIMAL_PLACES: u32 = 4;

/// Rounds a USD figure to cents, half away from zero.
pub fn round_usd(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(USD_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds an INR ledger figure to the stored precision.
pub fn round_inr(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(INR_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts an INR amount to USD at `rate` INR per USD: `round(amount_inr / rate, 2)`.
///
/// This is the only INR to USD conversion in the crate. A non-positive rate yields zero
/// so that a misconfigured rate can never divide by zero; settings validation rejects
/// such rates before they are stored.
pub fn to_usd(amount_inr: Decimal, rate: Decimal) -> Decimal {
    if rate <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_usd(amount_inr / rate)
}

/// Converts a USD amount back to INR at `rate`.
pub fn to_inr(amount_usd: Decimal, rate: Decimal) -> Decimal {
    round_inr(amount_usd * rate)
}

/// Applies a percentage fee and returns the net amount, rounded to cents.
pub fn net_of_fee(amount_usd: Decimal, fee_percent: Decimal) -> Decimal {
    round_usd(amount_usd * (Decimal::ONE_HUNDRED - fee_percent) / Decimal::ONE_HUNDRED)
}

/// Converts a USD amount into minor units (cents) for providers that require integers.
pub fn to_minor_units(amount_usd: Decimal) -> Option<i64> {
    (round_usd(amount_usd) * Decimal::ONE_HUNDRED).to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_usd_rounds_to_cents() {
        assert_eq!(to_usd(dec!(500), dec!(83)), dec!(6.02));
        assert_eq!(to_usd(dec!(1000), dec!(83.25)), dec!(12.01));
        assert_eq!(to_usd(dec!(830), dec!(83)), dec!(10));
    }

    #[test]
    fn test_to_usd_midpoint_rounds_away_from_zero() {
        // 0.125 exactly
        assert_eq!(to_usd(dec!(1), dec!(8)), dec!(0.13));
    }

    #[test]
    fn test_to_usd_non_positive_rate() {
        assert_eq!(to_usd(dec!(100), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(to_usd(dec!(100), dec!(-1)), Decimal::ZERO);
    }

    #[test]
    fn test_round_trip_within_one_rounding_unit() {
        let rate = dec!(83.17);
        for amount in [dec!(1), dec!(499.99), dec!(500), dec!(12345.67), dec!(99999)] {
            let usd = to_usd(amount, rate);
            let back = to_inr(usd, rate);
            // One cent of USD is worth `rate / 100` INR.
            let tolerance = rate * dec!(0.01);
            assert!(
                (back - amount).abs() <= tolerance,
                "{} -> {} -> {} exceeds tolerance {}",
                amount,
                usd,
                back,
                tolerance
            );
        }
    }

    #[test]
    fn test_net_of_fee() {
        assert_eq!(net_of_fee(dec!(100), dec!(1)), dec!(99));
        assert_eq!(net_of_fee(dec!(6.02), dec!(1)), dec!(5.96));
        assert_eq!(net_of_fee(dec!(50), Decimal::ZERO), dec!(50));
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(dec!(12.34)), Some(1234));
        assert_eq!(to_minor_units(dec!(12.345)), Some(1235));
        assert_eq!(to_minor_units(dec!(0)), Some(0));
    }
}
