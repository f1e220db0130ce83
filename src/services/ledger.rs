//! Ledger primitives.
//!
//! Every balance change in the crate goes through these functions. Each one locks the
//! wallet row, applies the mutation, and appends an audit row carrying the balance
//! before and after, all on the caller's connection so the caller decides the
//! transaction boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::currency::to_usd;
use crate::models::{
    EntryKind, InsufficientFundsError, LedgerReference, MainWalletTransaction, ReferenceType, UsdWallet,
    UsdWalletTransaction, User,
};
use crate::observability::{get_metrics, LatencyTimer};
use crate::repositories::{LedgerRepository, UsdWalletRepository, UserRepository};

/// Result of a main wallet mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainWalletMutation {
    pub user: User,
    pub entry: MainWalletTransaction,
}

/// Result of a USD wallet mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsdWalletMutation {
    pub wallet: UsdWallet,
    pub entry: UsdWalletTransaction,
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "Ledger amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Balance mutation helpers for the main wallet and the USD wallet.
pub struct Ledger;

impl Ledger {
    pub async fn credit_main_wallet(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
        reference: &LedgerReference,
    ) -> Result<MainWalletMutation> {
        Self::mutate_main_wallet(conn, user_id, EntryKind::Credit, amount, reference).await
    }

    /// Fails with `InsufficientFunds` and leaves the wallet untouched if the balance
    /// would go negative.
    pub async fn debit_main_wallet(
        conn: &mut PgConnection,
        user_id: Uuid,
        amount: Decimal,
        reference: &LedgerReference,
    ) -> Result<MainWalletMutation> {
        Self::mutate_main_wallet(conn, user_id, EntryKind::Debit, amount, reference).await
    }

    async fn mutate_main_wallet(
        conn: &mut PgConnection,
        user_id: Uuid,
        kind: EntryKind,
        amount: Decimal,
        reference: &LedgerReference,
    ) -> Result<MainWalletMutation> {
        ensure_positive(amount)?;
        let timer = LatencyTimer::new();

        let user = UserRepository::lock_by_id(conn, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        if kind == EntryKind::Debit && !user.has_sufficient_funds(amount) {
            return Err(InsufficientFundsError {
                requested: amount,
                available: user.main_wallet,
            }
            .into());
        }

        let entry = MainWalletTransaction::new(user_id, kind, amount, user.main_wallet, reference);
        let user = UserRepository::set_main_wallet(conn, user_id, entry.balance_after).await?;
        let entry = LedgerRepository::insert_main_wallet_transaction(conn, &entry).await?;

        debug!(
            user_id = %user_id,
            kind = ?kind,
            amount = %amount,
            balance_after = %entry.balance_after,
            reference_type = ?reference.reference_type,
            "Main wallet mutated"
        );
        get_metrics().record_ledger_write_latency(timer.elapsed_ms());

        Ok(MainWalletMutation { user, entry })
    }

    /// Credits the USD wallet and revalues it at `rate`. Funding credits also count
    /// toward `total_funded_inr`.
    pub async fn credit_usd_wallet(
        conn: &mut PgConnection,
        wallet_id: Uuid,
        amount_inr: Decimal,
        rate: Decimal,
        reference: &LedgerReference,
    ) -> Result<UsdWalletMutation> {
        Self::mutate_usd_wallet(conn, wallet_id, EntryKind::Credit, amount_inr, rate, reference).await
    }

    pub async fn debit_usd_wallet(
        conn: &mut PgConnection,
        wallet_id: Uuid,
        amount_inr: Decimal,
        rate: Decimal,
        reference: &LedgerReference,
    ) -> Result<UsdWalletMutation> {
        Self::mutate_usd_wallet(conn, wallet_id, EntryKind::Debit, amount_inr, rate, reference).await
    }

    async fn mutate_usd_wallet(
        conn: &mut PgConnection,
        wallet_id: Uuid,
        kind: EntryKind,
        amount_inr: Decimal,
        rate: Decimal,
        reference: &LedgerReference,
    ) -> Result<UsdWalletMutation> {
        ensure_positive(amount_inr)?;
        if rate <= Decimal::ZERO {
            return Err(AppError::Validation(format!("Exchange rate must be positive, got {}", rate)));
        }
        let timer = LatencyTimer::new();

        let mut wallet = UsdWalletRepository::lock_by_id(conn, wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("USD wallet {} not found", wallet_id)))?;

        match kind {
            EntryKind::Credit => {
                wallet.credit(amount_inr, rate);
                if reference.reference_type == ReferenceType::WalletFunding {
                    wallet.total_funded_inr += amount_inr;
                }
            }
            EntryKind::Debit => wallet.debit(amount_inr, rate)?,
        }

        let wallet = UsdWalletRepository::save_balances(conn, &wallet).await?;
        let entry = UsdWalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            user_id: wallet.user_id,
            kind,
            amount_inr,
            amount_usd: to_usd(amount_inr, rate),
            exchange_rate: rate,
            balance_after_inr: wallet.balance_inr,
            balance_after_usd: wallet.balance_usd,
            reference_type: reference.reference_type,
            reference_id: reference.reference_id,
            description: reference.description.clone(),
            created_at: chrono::Utc::now(),
        };
        let entry = LedgerRepository::insert_usd_wallet_transaction(conn, &entry).await?;

        debug!(
            wallet_id = %wallet_id,
            kind = ?kind,
            amount_inr = %amount_inr,
            rate = %rate,
            balance_after_inr = %wallet.balance_inr,
            "USD wallet mutated"
        );
        get_metrics().record_ledger_write_latency(timer.elapsed_ms());

        Ok(UsdWalletMutation { wallet, entry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive(dec!(0.0001)).is_ok());
        assert!(matches!(ensure_positive(Decimal::ZERO), Err(AppError::Validation(_))));
        assert!(matches!(ensure_positive(dec!(-5)), Err(AppError::Validation(_))));
    }
}
