use crate::error::{AppError, Result};
use crate::models::{MainWalletTransaction, UsdWalletTransaction};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for the append-only main wallet and USD wallet audit trails.
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_main_wallet_transaction(
        conn: &mut PgConnection,
        entry: &MainWalletTransaction,
    ) -> Result<MainWalletTransaction> {
        let row = sqlx::query_as::<_, MainWalletTransaction>(
            r#"
            INSERT INTO main_wallet_transactions (id, user_id, kind, amount, balance_before, balance_after, reference_type, reference_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, kind, amount, balance_before, balance_after, reference_type, reference_id, description, created_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.reference_type)
        .bind(entry.reference_id)
        .bind(&entry.description)
        .bind(entry.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Main wallet history for a user, oldest first.
    pub async fn find_main_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<MainWalletTransaction>> {
        let rows = sqlx::query_as::<_, MainWalletTransaction>(
            r#"
            SELECT id, user_id, kind, amount, balance_before, balance_after, reference_type, reference_id, description, created_at
            FROM main_wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn insert_usd_wallet_transaction(
        conn: &mut PgConnection,
        entry: &UsdWalletTransaction,
    ) -> Result<UsdWalletTransaction> {
        let row = sqlx::query_as::<_, UsdWalletTransaction>(
            r#"
            INSERT INTO usd_wallet_transactions (id, wallet_id, user_id, kind, amount_inr, amount_usd, exchange_rate, balance_after_inr, balance_after_usd, reference_type, reference_id, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, wallet_id, user_id, kind, amount_inr, amount_usd, exchange_rate, balance_after_inr, balance_after_usd, reference_type, reference_id, description, created_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.user_id)
        .bind(entry.kind)
        .bind(entry.amount_inr)
        .bind(entry.amount_usd)
        .bind(entry.exchange_rate)
        .bind(entry.balance_after_inr)
        .bind(entry.balance_after_usd)
        .bind(entry.reference_type)
        .bind(entry.reference_id)
        .bind(&entry.description)
        .bind(entry.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// USD wallet history for a user, oldest first.
    pub async fn find_usd_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<UsdWalletTransaction>> {
        let rows = sqlx::query_as::<_, UsdWalletTransaction>(
            r#"
            SELECT id, wallet_id, user_id, kind, amount_inr, amount_usd, exchange_rate, balance_after_inr, balance_after_usd, reference_type, reference_id, description, created_at
            FROM usd_wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// USD wallet rows written for a business reference, e.g. one withdrawal.
    pub async fn find_usd_wallet_transactions_by_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<UsdWalletTransaction>> {
        let rows = sqlx::query_as::<_, UsdWalletTransaction>(
            r#"
            SELECT id, wallet_id, user_id, kind, amount_inr, amount_usd, exchange_rate, balance_after_inr, balance_after_usd, reference_type, reference_id, description, created_at
            FROM usd_wallet_transactions
            WHERE reference_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
