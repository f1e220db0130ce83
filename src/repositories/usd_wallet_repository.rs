use crate::error::{AppError, Result};
use crate::models::{UsdWallet, WithdrawalMethod};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Payout preferences and provider linkage stored on a wallet.
#[derive(Debug, Clone, Default)]
pub struct WalletPreferences {
    pub preferred_withdrawal_method: Option<WithdrawalMethod>,
    pub bank_payout_account_id: Option<String>,
    pub crypto_address: Option<String>,
    pub crypto_network: Option<String>,
}

/// Repository for USD wallets.
pub struct UsdWalletRepository {
    pool: PgPool,
}

impl UsdWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<UsdWallet>> {
        let row = sqlx::query_as::<_, UsdWallet>(
            r#"
            SELECT id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                   preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at
            FROM usd_wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Inserts `wallet` unless the user already has one; either way returns the user's wallet.
    pub async fn insert_if_absent(conn: &mut PgConnection, wallet: &UsdWallet) -> Result<UsdWallet> {
        sqlx::query(
            r#"
            INSERT INTO usd_wallets (id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                                     preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.user_id)
        .bind(wallet.balance_inr)
        .bind(wallet.balance_usd)
        .bind(wallet.total_funded_inr)
        .bind(wallet.total_withdrawn_usd)
        .bind(wallet.last_exchange_rate)
        .bind(wallet.preferred_withdrawal_method)
        .bind(&wallet.bank_payout_account_id)
        .bind(&wallet.crypto_address)
        .bind(&wallet.crypto_network)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        let row = sqlx::query_as::<_, UsdWallet>(
            r#"
            SELECT id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                   preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at
            FROM usd_wallets
            WHERE user_id = $1
            "#,
        )
        .bind(wallet.user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Loads the user's wallet and locks the row until the surrounding transaction ends.
    pub async fn lock_by_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<UsdWallet>> {
        let row = sqlx::query_as::<_, UsdWallet>(
            r#"
            SELECT id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                   preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at
            FROM usd_wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<UsdWallet>> {
        let row = sqlx::query_as::<_, UsdWallet>(
            r#"
            SELECT id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                   preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at
            FROM usd_wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Persists balances and running totals. The caller must hold the row lock.
    pub async fn save_balances(conn: &mut PgConnection, wallet: &UsdWallet) -> Result<UsdWallet> {
        let row = sqlx::query_as::<_, UsdWallet>(
            r#"
            UPDATE usd_wallets
            SET balance_inr = $2,
                balance_usd = $3,
                total_funded_inr = $4,
                total_withdrawn_usd = $5,
                last_exchange_rate = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                      preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.balance_inr)
        .bind(wallet.balance_usd)
        .bind(wallet.total_funded_inr)
        .bind(wallet.total_withdrawn_usd)
        .bind(wallet.last_exchange_rate)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Overwrites the payout preferences of the user's wallet.
    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        preferences: &WalletPreferences,
    ) -> Result<Option<UsdWallet>> {
        let row = sqlx::query_as::<_, UsdWallet>(
            r#"
            UPDATE usd_wallets
            SET preferred_withdrawal_method = $2,
                bank_payout_account_id = $3,
                crypto_address = $4,
                crypto_network = $5,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING id, user_id, balance_inr, balance_usd, total_funded_inr, total_withdrawn_usd, last_exchange_rate,
                      preferred_withdrawal_method, bank_payout_account_id, crypto_address, crypto_network, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(preferences.preferred_withdrawal_method)
        .bind(&preferences.bank_payout_account_id)
        .bind(&preferences.crypto_address)
        .bind(&preferences.crypto_network)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
