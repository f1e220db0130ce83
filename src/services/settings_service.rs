use crate::error::{AppError, Result};
use crate::models::WithdrawalSettings;
use crate::repositories::SettingsRepository;
use sqlx::PgPool;

/// Reads and versions the withdrawal settings.
pub struct SettingsService {
    repo: SettingsRepository,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: SettingsRepository::new(pool),
        }
    }

    /// The current snapshot. Load once per operation and pass it down.
    pub async fn current(&self) -> Result<WithdrawalSettings> {
        self.repo.current().await
    }

    pub async fn version(&self, version: i32) -> Result<WithdrawalSettings> {
        self.repo
            .find_version(version)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Settings version {} not found", version)))
    }

    /// Validates `settings` and appends it as the new current version.
    pub async fn update(&self, mut settings: WithdrawalSettings, admin_id: &str) -> Result<WithdrawalSettings> {
        if admin_id.trim().is_empty() {
            return Err(AppError::Validation("admin id is required".to_string()));
        }
        settings
            .validate()
            .map_err(|errors| AppError::Validation(errors.join("; ")))?;

        settings.updated_by = Some(admin_id.to_string());
        let stored = self.repo.append(&settings).await?;

        tracing::info!(
            version = stored.version,
            updated_by = admin_id,
            exchange_rate = %stored.exchange_rate,
            "Withdrawal settings updated"
        );

        Ok(stored)
    }
}
