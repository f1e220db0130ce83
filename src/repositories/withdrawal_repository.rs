use crate::error::{AppError, Result};
use crate::models::{UsdWithdrawal, WithdrawalStatus};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for USD withdrawals.
///
/// Every status change is a conditional update on the expected source state, so a
/// withdrawal cannot be moved twice by concurrent callers.
pub struct WithdrawalRepository {
    pool: PgPool,
}

impl WithdrawalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(conn: &mut PgConnection, withdrawal: &UsdWithdrawal) -> Result<UsdWithdrawal> {
        let row = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            INSERT INTO usd_withdrawals (id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                                         withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                                         rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                      withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                      rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.user_id)
        .bind(withdrawal.wallet_id)
        .bind(withdrawal.amount_inr)
        .bind(withdrawal.amount_usd)
        .bind(withdrawal.exchange_rate)
        .bind(withdrawal.fee_percent)
        .bind(withdrawal.net_amount_usd)
        .bind(withdrawal.withdrawal_method)
        .bind(withdrawal.status)
        .bind(&withdrawal.destination)
        .bind(&withdrawal.crypto_network)
        .bind(&withdrawal.coin)
        .bind(&withdrawal.provider_reference)
        .bind(&withdrawal.remarks)
        .bind(&withdrawal.rejection_reason)
        .bind(withdrawal.settings_version)
        .bind(withdrawal.processed_at)
        .bind(&withdrawal.processed_by)
        .bind(withdrawal.created_at)
        .bind(withdrawal.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UsdWithdrawal>> {
        let row = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            SELECT id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                   withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                   rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            FROM usd_withdrawals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<UsdWithdrawal>> {
        let rows = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            SELECT id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                   withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                   rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            FROM usd_withdrawals
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_by_status(&self, status: WithdrawalStatus, limit: i64) -> Result<Vec<UsdWithdrawal>> {
        let rows = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            SELECT id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                   withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                   rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            FROM usd_withdrawals
            WHERE status = $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Moves a pending withdrawal to processing. Returns None if it was not pending.
    pub async fn claim_for_processing(&self, id: Uuid, processed_by: &str) -> Result<Option<UsdWithdrawal>> {
        let row = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            UPDATE usd_withdrawals
            SET status = 'PROCESSING', processed_by = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                      withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                      rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(processed_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Processing to completed.
    pub async fn mark_completed(
        conn: &mut PgConnection,
        id: Uuid,
        provider_reference: &str,
    ) -> Result<Option<UsdWithdrawal>> {
        let row = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            UPDATE usd_withdrawals
            SET status = 'COMPLETED', provider_reference = $2, processed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            RETURNING id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                      withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                      rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(provider_reference)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Processing to failed, with the provider error as remarks.
    pub async fn mark_failed(conn: &mut PgConnection, id: Uuid, remarks: &str) -> Result<Option<UsdWithdrawal>> {
        let row = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            UPDATE usd_withdrawals
            SET status = 'FAILED', remarks = $2, processed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            RETURNING id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                      withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                      rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(remarks)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Pending to rejected.
    pub async fn mark_rejected(
        conn: &mut PgConnection,
        id: Uuid,
        reason: &str,
        processed_by: &str,
    ) -> Result<Option<UsdWithdrawal>> {
        let row = sqlx::query_as::<_, UsdWithdrawal>(
            r#"
            UPDATE usd_withdrawals
            SET status = 'REJECTED', rejection_reason = $2, processed_by = $3, processed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING id, user_id, wallet_id, amount_inr, amount_usd, exchange_rate, fee_percent, net_amount_usd,
                      withdrawal_method, status, destination, crypto_network, coin, provider_reference, remarks,
                      rejection_reason, settings_version, processed_at, processed_by, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(processed_by)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
