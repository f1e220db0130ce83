use crate::error::{AppError, Result};
use crate::models::{CommissionSettlementPayload, LedgerReference, MainWalletTransaction, OutboxEvent, ReferenceType, User};
use crate::observability::get_metrics;
use crate::outbox;
use crate::repositories::{LevelRepository, OutboxRepository, UserRepository};
use crate::services::commission_processor::{CommissionProcessor, SettlementSummary};
use crate::services::ledger::Ledger;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// A committed level purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub user: User,
    pub debit: MainWalletTransaction,
    /// None when settlement failed in-line and was deferred.
    pub commissions: Option<SettlementSummary>,
    pub commissions_deferred: bool,
}

/// Level upgrades paid from the main wallet.
pub struct LevelPurchaseService {
    pool: PgPool,
    level_repo: LevelRepository,
    outbox_repo: OutboxRepository,
    commission_processor: CommissionProcessor,
}

impl LevelPurchaseService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            level_repo: LevelRepository::new(pool.clone()),
            outbox_repo: OutboxRepository::new(pool.clone()),
            commission_processor: CommissionProcessor::new(pool.clone()),
            pool,
        }
    }

    /// Buys `level_number` for `user_id`.
    ///
    /// The main wallet debit and level change commit together. Commissions are settled
    /// afterwards and a settlement failure never undoes the purchase.
    pub async fn purchase(&self, user_id: Uuid, level_number: i32) -> Result<Purchase> {
        let level = self
            .level_repo
            .find(level_number)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Level {} not found", level_number)))?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let user = UserRepository::lock_by_id(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        if level.level_number <= user.current_level {
            return Err(AppError::Validation(format!(
                "Level {} is not above current level {}",
                level.level_number, user.current_level
            )));
        }

        let reference = LedgerReference::new(ReferenceType::LevelPurchase, None)
            .with_description(format!("Level {} purchase", level.level_number));
        let debit = Ledger::debit_main_wallet(&mut tx, user_id, level.investment_amount, &reference).await?;
        let user = UserRepository::set_level(&mut tx, user_id, level.level_number).await?;

        tx.commit().await.map_err(AppError::Database)?;

        get_metrics().record_level_purchased(level.level_number);
        tracing::info!(
            user_id = %user_id,
            level_number = level.level_number,
            amount = %level.investment_amount,
            "Level purchased"
        );

        match self.commission_processor.settle_commissions(user_id, &level).await {
            Ok(summary) => Ok(Purchase {
                user,
                debit: debit.entry,
                commissions: Some(summary),
                commissions_deferred: false,
            }),
            Err(e) => {
                let payload = CommissionSettlementPayload {
                    purchaser_id: user_id,
                    level_number: level.level_number,
                };
                outbox::defer(&self.outbox_repo, OutboxEvent::commission_settlement(&payload), &e).await;
                Ok(Purchase {
                    user,
                    debit: debit.entry,
                    commissions: None,
                    commissions_deferred: true,
                })
            }
        }
    }
}
