use crate::error::{AppError, Result};
use crate::models::WithdrawalSettings;
use sqlx::PgPool;

/// Repository for versioned withdrawal settings. Rows are never updated; the highest
/// version is current.
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn current(&self) -> Result<WithdrawalSettings> {
        let row = sqlx::query_as::<_, WithdrawalSettings>(
            r#"
            SELECT version, bank_transfer_enabled, crypto_enabled, bank_transfer_fee_percent, crypto_fee_percent,
                   min_withdrawal_inr, max_withdrawal_inr, default_method, exchange_rate, crypto_coin,
                   crypto_network_minimums, updated_by, created_at
            FROM withdrawal_settings
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound("Withdrawal settings have not been configured".to_string()))
    }

    pub async fn find_version(&self, version: i32) -> Result<Option<WithdrawalSettings>> {
        let row = sqlx::query_as::<_, WithdrawalSettings>(
            r#"
            SELECT version, bank_transfer_enabled, crypto_enabled, bank_transfer_fee_percent, crypto_fee_percent,
                   min_withdrawal_inr, max_withdrawal_inr, default_method, exchange_rate, crypto_coin,
                   crypto_network_minimums, updated_by, created_at
            FROM withdrawal_settings
            WHERE version = $1
            "#,
        )
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Appends `settings` as a new version. The stored version number is assigned here.
    pub async fn append(&self, settings: &WithdrawalSettings) -> Result<WithdrawalSettings> {
        let row = sqlx::query_as::<_, WithdrawalSettings>(
            r#"
            INSERT INTO withdrawal_settings (bank_transfer_enabled, crypto_enabled, bank_transfer_fee_percent, crypto_fee_percent,
                                             min_withdrawal_inr, max_withdrawal_inr, default_method, exchange_rate, crypto_coin,
                                             crypto_network_minimums, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING version, bank_transfer_enabled, crypto_enabled, bank_transfer_fee_percent, crypto_fee_percent,
                      min_withdrawal_inr, max_withdrawal_inr, default_method, exchange_rate, crypto_coin,
                      crypto_network_minimums, updated_by, created_at
            "#,
        )
        .bind(settings.bank_transfer_enabled)
        .bind(settings.crypto_enabled)
        .bind(settings.bank_transfer_fee_percent)
        .bind(settings.crypto_fee_percent)
        .bind(settings.min_withdrawal_inr)
        .bind(settings.max_withdrawal_inr)
        .bind(settings.default_method)
        .bind(settings.exchange_rate)
        .bind(&settings.crypto_coin)
        .bind(&settings.crypto_network_minimums)
        .bind(&settings.updated_by)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
