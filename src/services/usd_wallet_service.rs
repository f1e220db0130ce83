use crate::error::{AppError, Result};
use crate::models::ledger_entry::net_inr;
use crate::models::{
    LedgerReference, MainWalletTransaction, ReferenceType, UsdWallet, UsdWalletTransaction, WithdrawalMethod,
    WithdrawalSettings,
};
use crate::observability::{get_metrics, mask_sensitive};
use crate::repositories::{LedgerRepository, UsdWalletRepository, WalletPreferences};
use crate::services::ledger::Ledger;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Result of moving funds from the main wallet into the USD wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funding {
    pub wallet: UsdWallet,
    pub main_wallet_entry: MainWalletTransaction,
    pub wallet_entry: UsdWalletTransaction,
}

/// Ledger-versus-balance check for one wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub wallet_id: Uuid,
    pub balance_inr: Decimal,
    pub ledger_net_inr: Decimal,
    pub transaction_count: usize,
    pub usd_consistent: bool,
}

impl ReconciliationReport {
    pub fn is_balanced(&self) -> bool {
        self.balance_inr == self.ledger_net_inr && self.usd_consistent
    }
}

pub struct UsdWalletService {
    pool: PgPool,
    wallet_repo: UsdWalletRepository,
    ledger_repo: LedgerRepository,
}

impl UsdWalletService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            wallet_repo: UsdWalletRepository::new(pool.clone()),
            ledger_repo: LedgerRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns the user's wallet, creating an empty one valued at the settings rate.
    pub async fn get_or_create(&self, user_id: Uuid, settings: &WithdrawalSettings) -> Result<UsdWallet> {
        if let Some(wallet) = self.wallet_repo.find_by_user(user_id).await? {
            return Ok(wallet);
        }

        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        let wallet = UsdWalletRepository::insert_if_absent(&mut conn, &UsdWallet::new(user_id, settings.exchange_rate))
            .await
            .map_err(|e| match e {
                AppError::Database(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                    AppError::NotFound(format!("User {} not found", user_id))
                }
                other => other,
            })?;

        tracing::info!(user_id = %user_id, wallet_id = %wallet.id, "USD wallet created");
        Ok(wallet)
    }

    pub async fn find(&self, user_id: Uuid) -> Result<UsdWallet> {
        self.wallet_repo
            .find_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("USD wallet for user {} not found", user_id)))
    }

    /// Moves `amount_inr` from the main wallet into the USD wallet at the settings rate.
    /// Both sides and their audit rows commit together.
    pub async fn fund_from_main_wallet(
        &self,
        user_id: Uuid,
        amount_inr: Decimal,
        settings: &WithdrawalSettings,
    ) -> Result<Funding> {
        if amount_inr <= Decimal::ZERO {
            return Err(AppError::Validation("Funding amount must be positive".to_string()));
        }

        let wallet = self.get_or_create(user_id, settings).await?;
        let funding_id = Uuid::new_v4();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let main_reference = LedgerReference::new(ReferenceType::WalletFunding, Some(funding_id))
            .with_description("Transfer to USD wallet");
        let main = Ledger::debit_main_wallet(&mut tx, user_id, amount_inr, &main_reference).await?;

        let wallet_reference = LedgerReference::new(ReferenceType::WalletFunding, Some(funding_id))
            .with_description("Funded from main wallet");
        let credit = Ledger::credit_usd_wallet(
            &mut tx,
            wallet.id,
            amount_inr,
            settings.exchange_rate,
            &wallet_reference,
        )
        .await?;

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_wallet_funded();
        tracing::info!(
            user_id = %user_id,
            amount_inr = %amount_inr,
            balance_inr = %credit.wallet.balance_inr,
            "USD wallet funded"
        );

        Ok(Funding {
            wallet: credit.wallet,
            main_wallet_entry: main.entry,
            wallet_entry: credit.entry,
        })
    }

    /// Replaces the payout preferences and linkage fields.
    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        preferences: WalletPreferences,
        settings: &WithdrawalSettings,
    ) -> Result<UsdWallet> {
        if let Some(method) = preferences.preferred_withdrawal_method {
            if !settings.is_enabled(method) {
                return Err(AppError::Validation(format!("Withdrawal method {} is disabled", method)));
            }
        }
        if let Some(network) = preferences.crypto_network.as_deref() {
            if settings.network_minimum(network).is_none() {
                return Err(AppError::Validation(format!("Unsupported crypto network: {}", network)));
            }
        }

        self.get_or_create(user_id, settings).await?;
        let wallet = self
            .wallet_repo
            .update_preferences(user_id, &preferences)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("USD wallet for user {} not found", user_id)))?;

        tracing::info!(
            user_id = %user_id,
            preferred = ?wallet.preferred_withdrawal_method,
            crypto_address = %wallet.crypto_address.as_deref().map(|a| mask_sensitive(a, 4)).unwrap_or_default(),
            bank_linked = wallet.linked_destination(WithdrawalMethod::BankTransfer).is_some(),
            "USD wallet preferences updated"
        );

        Ok(wallet)
    }

    pub async fn transactions(&self, user_id: Uuid) -> Result<Vec<UsdWalletTransaction>> {
        self.ledger_repo.find_usd_wallet_transactions(user_id).await
    }

    /// Compares the wallet balance with the sum of its ledger rows.
    pub async fn verify_reconciliation(&self, user_id: Uuid) -> Result<ReconciliationReport> {
        let wallet = self.find(user_id).await?;
        let transactions = self.ledger_repo.find_usd_wallet_transactions(user_id).await?;

        let report = ReconciliationReport {
            wallet_id: wallet.id,
            balance_inr: wallet.balance_inr,
            ledger_net_inr: net_inr(&transactions),
            transaction_count: transactions.len(),
            usd_consistent: wallet.usd_is_consistent(),
        };

        if !report.is_balanced() {
            tracing::error!(
                user_id = %user_id,
                balance_inr = %report.balance_inr,
                ledger_net_inr = %report.ledger_net_inr,
                "USD wallet does not reconcile with its ledger"
            );
        }

        Ok(report)
    }
}
