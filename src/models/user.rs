use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Length of generated referral codes.
pub const REFERRAL_CODE_LENGTH: usize = 8;

/// A platform user with a main wallet and referral counters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub referral_code: String,
    /// Direct upline, if the user signed up with a referral code.
    pub referred_by: Option<Uuid>,
    /// Primary balance in INR.
    pub main_wallet: Decimal,
    pub current_level: i32,
    pub direct_referrals: i32,
    pub total_referrals: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(referral_code: String, referred_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            referral_code,
            referred_by,
            main_wallet: Decimal::ZERO,
            current_level: 0,
            direct_referrals: 0,
            total_referrals: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.main_wallet >= amount
    }
}

/// Generates a referral code from a fresh UUID, upper-cased and truncated.
pub fn generate_referral_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(REFERRAL_CODE_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("ABCD1234".to_string(), None);
        assert_eq!(user.main_wallet, Decimal::ZERO);
        assert_eq!(user.current_level, 0);
        assert_eq!(user.direct_referrals, 0);
        assert!(user.referred_by.is_none());
    }

    #[test]
    fn test_has_sufficient_funds() {
        let mut user = User::new("ABCD1234".to_string(), None);
        user.main_wallet = dec!(1000);
        assert!(user.has_sufficient_funds(dec!(1000)));
        assert!(!user.has_sufficient_funds(dec!(1000.01)));
    }

    #[test]
    fn test_generate_referral_code() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_ne!(code, generate_referral_code());
    }
}
