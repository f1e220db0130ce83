use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{UsdWallet, UsdWithdrawal, User, WithdrawalMethod, WithdrawalStatus};
use crate::observability::mask_sensitive;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<ValidationErrorDetail>) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

/// HTTP status for an application error.
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::InvalidState(_) => StatusCode::CONFLICT,
        AppError::Provider(_) => StatusCode::BAD_GATEWAY,
        AppError::Database(_) | AppError::Migration(_) | AppError::Config(_) | AppError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Error half of every handler result.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        let status = status_for(&error);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, code = error.code(), "Request failed");
            "An internal error occurred".to_string()
        } else {
            tracing::warn!(error = %error, code = error.code(), "Request rejected");
            error.to_string()
        };

        Self {
            status,
            body: ErrorResponse::new(error.code(), message),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::new("VALIDATION_ERROR", "Request validation failed").with_details(details),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.body))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub main_wallet: Decimal,
    pub current_level: i32,
    pub direct_referrals: i32,
    pub total_referrals: i32,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            referral_code: user.referral_code,
            referred_by: user.referred_by,
            main_wallet: user.main_wallet,
            current_level: user.current_level,
            direct_referrals: user.direct_referrals,
            total_referrals: user.total_referrals,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub user: UserResponse,
    pub referral_edges_created: usize,
    pub referral_chain_deferred: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub user: UserResponse,
    pub amount_debited: Decimal,
    pub commissions_settled: usize,
    pub commissions_paid: Decimal,
    pub commissions_deferred: bool,
}

/// USD wallet view with linked destinations masked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance_inr: Decimal,
    pub balance_usd: Decimal,
    pub total_funded_inr: Decimal,
    pub total_withdrawn_usd: Decimal,
    pub exchange_rate: Decimal,
    pub preferred_withdrawal_method: Option<WithdrawalMethod>,
    pub bank_payout_account: Option<String>,
    pub crypto_address: Option<String>,
    pub crypto_network: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<UsdWallet> for WalletResponse {
    fn from(wallet: UsdWallet) -> Self {
        Self {
            id: wallet.id,
            user_id: wallet.user_id,
            balance_inr: wallet.balance_inr,
            balance_usd: wallet.balance_usd,
            total_funded_inr: wallet.total_funded_inr,
            total_withdrawn_usd: wallet.total_withdrawn_usd,
            exchange_rate: wallet.last_exchange_rate,
            preferred_withdrawal_method: wallet.preferred_withdrawal_method,
            bank_payout_account: wallet.bank_payout_account_id.as_deref().map(|a| mask_sensitive(a, 4)),
            crypto_address: wallet.crypto_address.as_deref().map(|a| mask_sensitive(a, 4)),
            crypto_network: wallet.crypto_network,
            updated_at: wallet.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_inr: Decimal,
    pub amount_usd: Decimal,
    pub exchange_rate: Decimal,
    pub fee_percent: Decimal,
    pub net_amount_usd: Decimal,
    pub withdrawal_method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub destination: String,
    pub crypto_network: Option<String>,
    pub coin: Option<String>,
    pub provider_reference: Option<String>,
    pub remarks: Option<String>,
    pub rejection_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UsdWithdrawal> for WithdrawalResponse {
    fn from(w: UsdWithdrawal) -> Self {
        Self {
            id: w.id,
            user_id: w.user_id,
            amount_inr: w.amount_inr,
            amount_usd: w.amount_usd,
            exchange_rate: w.exchange_rate,
            fee_percent: w.fee_percent,
            net_amount_usd: w.net_amount_usd,
            withdrawal_method: w.withdrawal_method,
            status: w.status,
            destination: mask_sensitive(&w.destination, 4),
            crypto_network: w.crypto_network,
            coin: w.coin,
            provider_reference: w.provider_reference,
            remarks: w.remarks,
            rejection_reason: w.rejection_reason,
            processed_at: w.processed_at,
            processed_by: w.processed_by,
            created_at: w.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AppError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AppError::InvalidState("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&AppError::InsufficientFunds {
                requested: dec!(600),
                available: dec!(500)
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&AppError::Provider(ProviderError::Timeout(100))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = ApiError::from(AppError::Internal(anyhow::anyhow!("connection string leaked")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.code, "INTERNAL_ERROR");
        assert!(!err.body.message.contains("leaked"));
    }

    #[test]
    fn test_wallet_response_masks_destinations() {
        let mut wallet = UsdWallet::new(Uuid::new_v4(), dec!(83));
        wallet.crypto_address = Some("TXyz1234567890".to_string());
        let response = WalletResponse::from(wallet);
        assert_eq!(response.crypto_address.as_deref(), Some("TXyz******7890"));
        assert!(response.bank_payout_account.is_none());
    }
}
