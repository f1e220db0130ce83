use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::currency::{net_of_fee, to_usd};
use crate::models::{
    LedgerReference, ReferenceType, UsdWallet, UsdWithdrawal, WithdrawalMethod, WithdrawalSettings, WithdrawalStatus,
};
use crate::observability::{get_metrics, mask_sensitive};
use crate::providers::{PayoutInstruction, PayoutRails, PayoutStatus, ProviderError};
use crate::repositories::{UsdWalletRepository, WithdrawalRepository};
use crate::services::ledger::Ledger;

/// Withdrawal request as submitted by a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub amount_inr: Decimal,
    /// Overrides the wallet preference and the global default.
    pub method: Option<WithdrawalMethod>,
    /// Overrides the destination linked on the wallet.
    pub destination: Option<String>,
    pub crypto_network: Option<String>,
}

/// A single validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Collected validation failures for a withdrawal request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    fn into_app_error(self) -> AppError {
        let message = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        AppError::Validation(message)
    }
}

/// Everything a new withdrawal needs, computed from one settings snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalPlan {
    pub method: WithdrawalMethod,
    pub amount_inr: Decimal,
    pub amount_usd: Decimal,
    pub exchange_rate: Decimal,
    pub fee_percent: Decimal,
    pub net_amount_usd: Decimal,
    pub destination: String,
    pub crypto_network: Option<String>,
    pub coin: Option<String>,
    pub settings_version: i32,
}

impl WithdrawalPlan {
    pub fn into_withdrawal(self, wallet: &UsdWallet) -> UsdWithdrawal {
        let now = Utc::now();
        UsdWithdrawal {
            id: Uuid::new_v4(),
            user_id: wallet.user_id,
            wallet_id: wallet.id,
            amount_inr: self.amount_inr,
            amount_usd: self.amount_usd,
            exchange_rate: self.exchange_rate,
            fee_percent: self.fee_percent,
            net_amount_usd: self.net_amount_usd,
            withdrawal_method: self.method,
            status: WithdrawalStatus::Pending,
            destination: self.destination,
            crypto_network: self.crypto_network,
            coin: self.coin,
            provider_reference: None,
            remarks: None,
            rejection_reason: None,
            settings_version: self.settings_version,
            processed_at: None,
            processed_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validates `request` against `wallet` and `settings` and prices it.
///
/// Insufficient balance is reported as `InsufficientFunds`; every other problem is
/// collected into one `Validation` error.
pub fn plan_withdrawal(
    wallet: &UsdWallet,
    request: &WithdrawalRequest,
    settings: &WithdrawalSettings,
) -> Result<WithdrawalPlan> {
    let amount_inr = request.amount_inr;
    if amount_inr <= Decimal::ZERO {
        return Err(AppError::Validation("amount_inr: Amount must be positive".to_string()));
    }
    if !wallet.has_sufficient_funds(amount_inr) {
        return Err(AppError::InsufficientFunds {
            requested: amount_inr,
            available: wallet.balance_inr,
        });
    }

    let mut result = ValidationResult::default();

    if amount_inr < settings.min_withdrawal_inr {
        result.add_error(ValidationError::new(
            "amount_inr",
            format!("Minimum withdrawal is {}", settings.min_withdrawal_inr),
            "BELOW_MINIMUM",
        ));
    }
    if amount_inr > settings.max_withdrawal_inr {
        result.add_error(ValidationError::new(
            "amount_inr",
            format!("Maximum withdrawal is {}", settings.max_withdrawal_inr),
            "ABOVE_MAXIMUM",
        ));
    }

    let method = settings.resolve_method(request.method, wallet.preferred_withdrawal_method);
    if !settings.is_enabled(method) {
        result.add_error(ValidationError::new(
            "method",
            format!("Withdrawal method {} is disabled", method),
            "METHOD_DISABLED",
        ));
    }

    let destination = request
        .destination
        .as_deref()
        .or_else(|| wallet.linked_destination(method))
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    if destination.is_none() {
        result.add_error(ValidationError::new(
            "destination",
            format!("No {} destination linked", method),
            "DESTINATION_REQUIRED",
        ));
    }

    let exchange_rate = settings.exchange_rate;
    let fee_percent = settings.fee_percent(method);
    let amount_usd = to_usd(amount_inr, exchange_rate);
    let net_amount_usd = net_of_fee(amount_usd, fee_percent);

    let mut crypto_network = None;
    let mut coin = None;
    if method == WithdrawalMethod::Crypto {
        let network = request
            .crypto_network
            .as_deref()
            .or(wallet.crypto_network.as_deref())
            .map(|n| n.trim().to_uppercase())
            .filter(|n| !n.is_empty());

        match network {
            None => result.add_error(ValidationError::new(
                "crypto_network",
                "Crypto network is required",
                "NETWORK_REQUIRED",
            )),
            Some(network) => {
                match settings.network_minimum(&network) {
                    None => result.add_error(ValidationError::new(
                        "crypto_network",
                        format!("Unsupported crypto network: {}", network),
                        "NETWORK_UNSUPPORTED",
                    )),
                    Some(minimum) if net_amount_usd < minimum => result.add_error(ValidationError::new(
                        "amount_inr",
                        format!(
                            "Net amount {} USD is below the {} minimum of {} USD",
                            net_amount_usd, network, minimum
                        ),
                        "BELOW_NETWORK_MINIMUM",
                    )),
                    Some(_) => {}
                }
                crypto_network = Some(network);
            }
        }
        coin = Some(settings.crypto_coin.clone());
    }

    if net_amount_usd <= Decimal::ZERO {
        result.add_error(ValidationError::new(
            "amount_inr",
            "Net payout amount must be positive",
            "INVALID_AMOUNT",
        ));
    }

    if !result.is_valid() {
        return Err(result.into_app_error());
    }

    Ok(WithdrawalPlan {
        method,
        amount_inr,
        amount_usd,
        exchange_rate,
        fee_percent,
        net_amount_usd,
        destination: destination.unwrap_or_default(),
        crypto_network,
        coin,
        settings_version: settings.version,
    })
}

/// Withdrawal settlement: reserve on create, then dispatch, reject or reconcile.
pub struct WithdrawalService {
    pool: PgPool,
    withdrawal_repo: WithdrawalRepository,
}

impl WithdrawalService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            withdrawal_repo: WithdrawalRepository::new(pool.clone()),
            pool,
        }
    }

    /// Creates a pending withdrawal and reserves its amount from the USD wallet.
    pub async fn create(
        &self,
        user_id: Uuid,
        request: &WithdrawalRequest,
        settings: &WithdrawalSettings,
    ) -> Result<UsdWithdrawal> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let wallet = UsdWalletRepository::lock_by_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("USD wallet for user {} not found", user_id)))?;

        let plan = plan_withdrawal(&wallet, request, settings)?;
        let withdrawal = WithdrawalRepository::insert(&mut tx, &plan.into_withdrawal(&wallet)).await?;

        let reference = LedgerReference::new(ReferenceType::Withdrawal, Some(withdrawal.id))
            .with_description(format!("{} withdrawal", withdrawal.withdrawal_method));
        Ledger::debit_usd_wallet(
            &mut tx,
            wallet.id,
            withdrawal.amount_inr,
            withdrawal.exchange_rate,
            &reference,
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_withdrawal_created(withdrawal.withdrawal_method.as_str());
        tracing::info!(
            withdrawal_id = %withdrawal.id,
            user_id = %user_id,
            method = %withdrawal.withdrawal_method,
            amount_inr = %withdrawal.amount_inr,
            net_amount_usd = %withdrawal.net_amount_usd,
            destination = %mask_sensitive(&withdrawal.destination, 4),
            "Withdrawal created"
        );

        Ok(withdrawal)
    }

    /// Dispatches a pending withdrawal to its rail.
    ///
    /// A provider error or timeout is not an error here: the withdrawal is returned
    /// `FAILED` with its funds back in the wallet.
    pub async fn approve(&self, id: Uuid, admin_id: &str, rails: &PayoutRails) -> Result<UsdWithdrawal> {
        let existing = self.get(id).await?;
        if !existing.can_transition_to(WithdrawalStatus::Processing) {
            return Err(invalid_state(&existing, WithdrawalStatus::Processing));
        }
        if !rails.is_configured(existing.withdrawal_method) {
            return Err(ProviderError::NotConfigured(existing.withdrawal_method).into());
        }

        let withdrawal = self
            .withdrawal_repo
            .claim_for_processing(id, admin_id)
            .await?
            .ok_or_else(|| invalid_state(&existing, WithdrawalStatus::Processing))?;

        let instruction = PayoutInstruction {
            method: withdrawal.withdrawal_method,
            client_reference: withdrawal.client_reference(),
            amount_usd: withdrawal.net_amount_usd,
            destination: withdrawal.destination.clone(),
            network: withdrawal.crypto_network.clone(),
            coin: withdrawal.coin.clone(),
        };

        match rails.dispatch(&instruction).await {
            Ok(receipt) => self.complete(&withdrawal, &receipt.reference).await,
            Err(e) => self.fail(&withdrawal, &e.to_string(), failure_reason(&e)).await,
        }
    }

    /// Rejects a pending withdrawal and returns its funds.
    pub async fn reject(&self, id: Uuid, reason: &str, admin_id: &str) -> Result<UsdWithdrawal> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("reason: Rejection reason is required".to_string()));
        }
        let existing = self.get(id).await?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let withdrawal = WithdrawalRepository::mark_rejected(&mut tx, id, reason, admin_id)
            .await?
            .ok_or_else(|| invalid_state(&existing, WithdrawalStatus::Rejected))?;
        Self::compensate(&mut tx, &withdrawal).await?;
        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_withdrawal_rejected(withdrawal.withdrawal_method.as_str());
        tracing::info!(
            withdrawal_id = %id,
            rejected_by = admin_id,
            reason = reason,
            "Withdrawal rejected"
        );

        Ok(withdrawal)
    }

    /// Resolves a withdrawal left `PROCESSING` by asking its rail what happened.
    pub async fn reconcile(&self, id: Uuid, rails: &PayoutRails) -> Result<UsdWithdrawal> {
        let withdrawal = self.get(id).await?;
        if withdrawal.status != WithdrawalStatus::Processing {
            return Err(AppError::InvalidState(format!(
                "Withdrawal {} is {:?}, only PROCESSING withdrawals can be reconciled",
                id, withdrawal.status
            )));
        }

        let status = rails
            .status(withdrawal.withdrawal_method, &withdrawal.client_reference())
            .await?;
        tracing::info!(withdrawal_id = %id, provider_status = ?status, "Reconciling withdrawal");

        match status {
            PayoutStatus::Completed { reference } => self.complete(&withdrawal, &reference).await,
            PayoutStatus::Failed { reason } => self.fail(&withdrawal, &reason, "provider_failed").await,
            PayoutStatus::NotFound => {
                self.fail(&withdrawal, "Payout not found at provider", "not_found")
                    .await
            }
            PayoutStatus::Pending => Ok(withdrawal),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<UsdWithdrawal> {
        self.withdrawal_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Withdrawal {} not found", id)))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<UsdWithdrawal>> {
        self.withdrawal_repo.find_by_user(user_id).await
    }

    pub async fn list_by_status(&self, status: WithdrawalStatus, limit: i64) -> Result<Vec<UsdWithdrawal>> {
        self.withdrawal_repo.find_by_status(status, limit).await
    }

    async fn complete(&self, withdrawal: &UsdWithdrawal, provider_reference: &str) -> Result<UsdWithdrawal> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let completed = WithdrawalRepository::mark_completed(&mut tx, withdrawal.id, provider_reference)
            .await?
            .ok_or_else(|| invalid_state(withdrawal, WithdrawalStatus::Completed))?;

        let mut wallet = UsdWalletRepository::lock_by_id(&mut tx, completed.wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("USD wallet {} not found", completed.wallet_id)))?;
        wallet.record_withdrawn(completed.amount_usd);
        UsdWalletRepository::save_balances(&mut tx, &wallet).await?;

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_withdrawal_completed(completed.withdrawal_method.as_str());
        tracing::info!(
            withdrawal_id = %completed.id,
            provider_reference = provider_reference,
            net_amount_usd = %completed.net_amount_usd,
            "Withdrawal completed"
        );

        Ok(completed)
    }

    async fn fail(&self, withdrawal: &UsdWithdrawal, remarks: &str, reason: &str) -> Result<UsdWithdrawal> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let failed = WithdrawalRepository::mark_failed(&mut tx, withdrawal.id, remarks)
            .await?
            .ok_or_else(|| invalid_state(withdrawal, WithdrawalStatus::Failed))?;
        Self::compensate(&mut tx, &failed).await?;

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_withdrawal_failed(failed.withdrawal_method.as_str(), reason);
        tracing::warn!(
            withdrawal_id = %failed.id,
            method = %failed.withdrawal_method,
            remarks = remarks,
            "Withdrawal failed, funds returned"
        );

        Ok(failed)
    }

    /// Credits the reserved amount back at the rate captured on the withdrawal.
    async fn compensate(conn: &mut PgConnection, withdrawal: &UsdWithdrawal) -> Result<()> {
        ensure_refundable(withdrawal)?;
        let reference = LedgerReference::new(ReferenceType::WithdrawalRefund, Some(withdrawal.id))
            .with_description(format!("Refund of {:?} withdrawal", withdrawal.status));
        Ledger::credit_usd_wallet(
            conn,
            withdrawal.wallet_id,
            withdrawal.amount_inr,
            withdrawal.exchange_rate,
            &reference,
        )
        .await?;
        Ok(())
    }
}

/// Only failed or rejected withdrawals have reserved funds to hand back.
fn ensure_refundable(withdrawal: &UsdWithdrawal) -> Result<()> {
    if withdrawal.status.requires_compensation() {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "Withdrawal {} is {:?} and holds no funds to return",
            withdrawal.id, withdrawal.status
        )))
    }
}

fn invalid_state(withdrawal: &UsdWithdrawal, target: WithdrawalStatus) -> AppError {
    AppError::InvalidState(format!(
        "Withdrawal {} cannot move to {:?}",
        withdrawal.id, target
    ))
}

fn failure_reason(error: &ProviderError) -> &'static str {
    match error {
        ProviderError::Timeout(_) => "timeout",
        ProviderError::Http(_) => "http",
        ProviderError::Api { .. } => "api",
        ProviderError::InvalidResponse(_) => "invalid_response",
        ProviderError::InvalidInstruction(_) => "invalid_instruction",
        ProviderError::NotConfigured(_) => "not_configured",
    }
}
