use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;

use super::withdrawal::WithdrawalMethod;

/// A versioned snapshot of the global withdrawal configuration.
///
/// Snapshots are append-only: the highest `version` is current. Engine operations take
/// a snapshot by reference so every value they use comes from one consistent version.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WithdrawalSettings {
    pub version: i32,
    pub bank_transfer_enabled: bool,
    pub crypto_enabled: bool,
    pub bank_transfer_fee_percent: Decimal,
    pub crypto_fee_percent: Decimal,
    pub min_withdrawal_inr: Decimal,
    pub max_withdrawal_inr: Decimal,
    pub default_method: WithdrawalMethod,
    /// INR per USD.
    pub exchange_rate: Decimal,
    pub crypto_coin: String,
    /// Minimum net (post-fee) USD amount per crypto network, keyed by network code.
    pub crypto_network_minimums: Json<BTreeMap<String, Decimal>>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Default for WithdrawalSettings {
    fn default() -> Self {
        let mut minimums = BTreeMap::new();
        minimums.insert("TRX".to_string(), Decimal::from(10));
        minimums.insert("BSC".to_string(), Decimal::from(10));
        minimums.insert("ETH".to_string(), Decimal::from(20));
        minimums.insert("MATIC".to_string(), Decimal::from(5));

        Self {
            version: 0,
            bank_transfer_enabled: true,
            crypto_enabled: true,
            bank_transfer_fee_percent: Decimal::ZERO,
            crypto_fee_percent: Decimal::ONE,
            min_withdrawal_inr: Decimal::from(500),
            max_withdrawal_inr: Decimal::from(500_000),
            default_method: WithdrawalMethod::Crypto,
            exchange_rate: Decimal::from(83),
            crypto_coin: "USDT".to_string(),
            crypto_network_minimums: Json(minimums),
            updated_by: None,
            created_at: Utc::now(),
        }
    }
}

impl WithdrawalSettings {
    pub fn is_enabled(&self, method: WithdrawalMethod) -> bool {
        match method {
            WithdrawalMethod::BankTransfer => self.bank_transfer_enabled,
            WithdrawalMethod::Crypto => self.crypto_enabled,
        }
    }

    pub fn fee_percent(&self, method: WithdrawalMethod) -> Decimal {
        match method {
            WithdrawalMethod::BankTransfer => self.bank_transfer_fee_percent,
            WithdrawalMethod::Crypto => self.crypto_fee_percent,
        }
    }

    /// Minimum net USD payout on `network`; networks are matched case-insensitively.
    pub fn network_minimum(&self, network: &str) -> Option<Decimal> {
        let key = network.trim().to_uppercase();
        self.crypto_network_minimums
            .iter()
            .find(|(name, _)| name.to_uppercase() == key)
            .map(|(_, min)| *min)
    }

    /// Picks the rail: explicit request, then the wallet's preference, then the default.
    pub fn resolve_method(
        &self,
        requested: Option<WithdrawalMethod>,
        wallet_preference: Option<WithdrawalMethod>,
    ) -> WithdrawalMethod {
        requested.or(wallet_preference).unwrap_or(self.default_method)
    }

    /// Checks internal consistency. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let hundred = Decimal::ONE_HUNDRED;

        if self.exchange_rate <= Decimal::ZERO {
            errors.push("exchange_rate must be positive".to_string());
        }
        for (name, fee) in [
            ("bank_transfer_fee_percent", self.bank_transfer_fee_percent),
            ("crypto_fee_percent", self.crypto_fee_percent),
        ] {
            if fee < Decimal::ZERO || fee >= hundred {
                errors.push(format!("{} must be in [0, 100)", name));
            }
        }
        if self.min_withdrawal_inr <= Decimal::ZERO {
            errors.push("min_withdrawal_inr must be positive".to_string());
        }
        if self.min_withdrawal_inr > self.max_withdrawal_inr {
            errors.push("min_withdrawal_inr cannot exceed max_withdrawal_inr".to_string());
        }
        if !self.is_enabled(self.default_method) {
            errors.push(format!("default method {} is disabled", self.default_method));
        }
        if self.crypto_coin.trim().is_empty() {
            errors.push("crypto_coin is required".to_string());
        }
        if self.crypto_network_minimums.values().any(|m| *m < Decimal::ZERO) {
            errors.push("crypto network minimums cannot be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(WithdrawalSettings::default().validate().is_ok());
    }

    #[test]
    fn test_resolve_method_priority() {
        let settings = WithdrawalSettings::default();
        assert_eq!(
            settings.resolve_method(
                Some(WithdrawalMethod::BankTransfer),
                Some(WithdrawalMethod::Crypto)
            ),
            WithdrawalMethod::BankTransfer
        );
        assert_eq!(
            settings.resolve_method(None, Some(WithdrawalMethod::BankTransfer)),
            WithdrawalMethod::BankTransfer
        );
        assert_eq!(settings.resolve_method(None, None), WithdrawalMethod::Crypto);
    }

    #[test]
    fn test_network_minimum_case_insensitive() {
        let settings = WithdrawalSettings::default();
        assert_eq!(settings.network_minimum("trx"), Some(dec!(10)));
        assert_eq!(settings.network_minimum("ETH"), Some(dec!(20)));
        assert_eq!(settings.network_minimum("SOL"), None);
    }

    #[test]
    fn test_validate_collects_errors() {
        let settings = WithdrawalSettings {
            exchange_rate: Decimal::ZERO,
            crypto_fee_percent: dec!(100),
            min_withdrawal_inr: dec!(1000),
            max_withdrawal_inr: dec!(10),
            crypto_enabled: false,
            ..WithdrawalSettings::default()
        };
        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_fee_and_enabled_by_method() {
        let settings = WithdrawalSettings {
            bank_transfer_enabled: false,
            bank_transfer_fee_percent: dec!(2),
            ..WithdrawalSettings::default()
        };
        assert!(!settings.is_enabled(WithdrawalMethod::BankTransfer));
        assert!(settings.is_enabled(WithdrawalMethod::Crypto));
        assert_eq!(settings.fee_percent(WithdrawalMethod::BankTransfer), dec!(2));
        assert_eq!(settings.fee_percent(WithdrawalMethod::Crypto), dec!(1));
    }
}
