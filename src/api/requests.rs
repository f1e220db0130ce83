use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{WithdrawalMethod, WithdrawalSettings};
use crate::repositories::WalletPreferences;
use crate::services::WithdrawalRequest;

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        let mut error = ValidationError::new("positive");
        error.message = Some("must be positive".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(length(min = 1, max = 32))]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseLevelRequest {
    #[validate(range(min = 1))]
    pub level_number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FundWalletRequest {
    #[validate(custom = "positive_amount")]
    pub amount_inr: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePreferencesRequest {
    pub preferred_withdrawal_method: Option<WithdrawalMethod>,
    #[validate(length(min = 1, max = 128))]
    pub bank_payout_account_id: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub crypto_address: Option<String>,
    #[validate(length(min = 2, max = 16))]
    pub crypto_network: Option<String>,
}

impl From<UpdatePreferencesRequest> for WalletPreferences {
    fn from(request: UpdatePreferencesRequest) -> Self {
        Self {
            preferred_withdrawal_method: request.preferred_withdrawal_method,
            bank_payout_account_id: request.bank_payout_account_id,
            crypto_address: request.crypto_address,
            crypto_network: request.crypto_network.map(|n| n.trim().to_uppercase()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateWithdrawalRequest {
    pub user_id: Uuid,
    #[validate(custom = "positive_amount")]
    pub amount_inr: Decimal,
    pub method: Option<WithdrawalMethod>,
    #[validate(length(min = 1, max = 128))]
    pub destination: Option<String>,
    #[validate(length(min = 2, max = 16))]
    pub crypto_network: Option<String>,
}

impl CreateWithdrawalRequest {
    pub fn to_withdrawal_request(&self) -> WithdrawalRequest {
        WithdrawalRequest {
            amount_inr: self.amount_inr,
            method: self.method,
            destination: self.destination.clone(),
            crypto_network: self.crypto_network.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApproveWithdrawalRequest {
    #[validate(length(min = 1, max = 64))]
    pub admin_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RejectWithdrawalRequest {
    #[validate(length(min = 1, max = 64))]
    pub admin_id: String,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Full replacement of the withdrawal settings. Cross-field rules are checked by
/// [`WithdrawalSettings::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(length(min = 1, max = 64))]
    pub admin_id: String,
    pub bank_transfer_enabled: bool,
    pub crypto_enabled: bool,
    pub bank_transfer_fee_percent: Decimal,
    pub crypto_fee_percent: Decimal,
    pub min_withdrawal_inr: Decimal,
    pub max_withdrawal_inr: Decimal,
    pub default_method: WithdrawalMethod,
    #[validate(custom = "positive_amount")]
    pub exchange_rate: Decimal,
    #[validate(length(min = 1, max = 16))]
    pub crypto_coin: String,
    pub crypto_network_minimums: BTreeMap<String, Decimal>,
}

impl UpdateSettingsRequest {
    pub fn to_settings(&self) -> WithdrawalSettings {
        WithdrawalSettings {
            bank_transfer_enabled: self.bank_transfer_enabled,
            crypto_enabled: self.crypto_enabled,
            bank_transfer_fee_percent: self.bank_transfer_fee_percent,
            crypto_fee_percent: self.crypto_fee_percent,
            min_withdrawal_inr: self.min_withdrawal_inr,
            max_withdrawal_inr: self.max_withdrawal_inr,
            default_method: self.default_method,
            exchange_rate: self.exchange_rate,
            crypto_coin: self.crypto_coin.trim().to_uppercase(),
            crypto_network_minimums: sqlx::types::Json(
                self.crypto_network_minimums
                    .iter()
                    .map(|(network, min)| (network.trim().to_uppercase(), *min))
                    .collect(),
            ),
            ..WithdrawalSettings::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListWithdrawalsQuery {
    pub user_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fund_request_requires_positive_amount() {
        assert!(FundWalletRequest { amount_inr: dec!(100) }.validate().is_ok());

        let errors = FundWalletRequest { amount_inr: Decimal::ZERO }.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("amount_inr"));
    }

    #[test]
    fn test_reject_request_requires_reason() {
        let request = RejectWithdrawalRequest {
            admin_id: "admin-1".to_string(),
            reason: String::new(),
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("reason"));
    }

    #[test]
    fn test_purchase_request_level_range() {
        assert!(PurchaseLevelRequest { level_number: 1 }.validate().is_ok());
        assert!(PurchaseLevelRequest { level_number: 0 }.validate().is_err());
    }

    #[test]
    fn test_preferences_normalize_network() {
        let request = UpdatePreferencesRequest {
            crypto_network: Some(" trx ".to_string()),
            ..UpdatePreferencesRequest::default()
        };
        let prefs = WalletPreferences::from(request);
        assert_eq!(prefs.crypto_network.as_deref(), Some("TRX"));
    }

    #[test]
    fn test_settings_request_to_snapshot() {
        let mut minimums = BTreeMap::new();
        minimums.insert("trx".to_string(), dec!(10));
        let request = UpdateSettingsRequest {
            admin_id: "admin-1".to_string(),
            bank_transfer_enabled: true,
            crypto_enabled: true,
            bank_transfer_fee_percent: dec!(0.5),
            crypto_fee_percent: dec!(1),
            min_withdrawal_inr: dec!(500),
            max_withdrawal_inr: dec!(100000),
            default_method: WithdrawalMethod::BankTransfer,
            exchange_rate: dec!(84),
            crypto_coin: "usdt".to_string(),
            crypto_network_minimums: minimums,
        };
        assert!(request.validate().is_ok());

        let settings = request.to_settings();
        assert_eq!(settings.exchange_rate, dec!(84));
        assert_eq!(settings.crypto_coin, "USDT");
        assert_eq!(settings.network_minimum("TRX"), Some(dec!(10)));
        assert!(settings.validate().is_ok());
    }
}
