use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::currency::round_inr;
use super::referral::ReferralTier;

/// A purchasable level with its price, daily yield, and per-tier commission rates.
/// Rates are percentages of `investment_amount`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Level {
    pub level_number: i32,
    pub investment_amount: Decimal,
    pub daily_income: Decimal,
    pub a_level_commission_rate: Decimal,
    pub b_level_commission_rate: Decimal,
    pub c_level_commission_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Level {
    pub fn new(level_number: i32, investment_amount: Decimal, daily_income: Decimal) -> Self {
        Self {
            level_number,
            investment_amount,
            daily_income,
            a_level_commission_rate: Decimal::ZERO,
            b_level_commission_rate: Decimal::ZERO,
            c_level_commission_rate: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    pub fn with_commission_rates(mut self, a: Decimal, b: Decimal, c: Decimal) -> Self {
        self.a_level_commission_rate = a;
        self.b_level_commission_rate = b;
        self.c_level_commission_rate = c;
        self
    }

    /// Returns the commission rate (percent) paid to an ancestor at `tier`.
    pub fn commission_rate(&self, tier: ReferralTier) -> Decimal {
        match tier {
            ReferralTier::A => self.a_level_commission_rate,
            ReferralTier::B => self.b_level_commission_rate,
            ReferralTier::C => self.c_level_commission_rate,
        }
    }

    /// Commission owed to an ancestor at `tier` for a purchase of this level.
    pub fn commission_for(&self, tier: ReferralTier) -> Decimal {
        commission_amount(self.investment_amount, self.commission_rate(tier))
    }
}

/// `purchase_amount * rate / 100`, rounded to ledger precision.
pub fn commission_amount(purchase_amount: Decimal, rate: Decimal) -> Decimal {
    if rate <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_inr(purchase_amount * rate / Decimal::ONE_HUNDRED)
}
