use crate::error::{AppError, Result};
use crate::models::level::commission_amount;
use crate::models::{CommissionHistoryEntry, LedgerReference, Level, ReferenceType};
use crate::observability::get_metrics;
use crate::repositories::{LevelRepository, ReferralRepository};
use crate::services::ledger::Ledger;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of settling a purchaser's pending commissions for one purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub purchaser_id: Uuid,
    pub level_number: i32,
    pub settled: Vec<CommissionHistoryEntry>,
    pub total_paid: Decimal,
    /// Entries another settlement completed first.
    pub skipped: usize,
}

impl SettlementSummary {
    fn new(purchaser_id: Uuid, level_number: i32) -> Self {
        Self {
            purchaser_id,
            level_number,
            settled: Vec::new(),
            total_paid: Decimal::ZERO,
            skipped: 0,
        }
    }
}

/// Pays tiered commissions to a purchaser's ancestors.
///
/// Each pending entry settles in its own transaction and flips to completed exactly
/// once, so a relationship pays out at most once over the referred user's lifetime.
pub struct CommissionProcessor {
    pool: PgPool,
    referral_repo: ReferralRepository,
    level_repo: LevelRepository,
}

impl CommissionProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            referral_repo: ReferralRepository::new(pool.clone()),
            level_repo: LevelRepository::new(pool.clone()),
            pool,
        }
    }

    /// Settles every pending entry where `purchaser_id` is the referred user, using the
    /// purchased level's tier rates against its investment amount.
    ///
    /// Entries are attempted independently. If any fail, the first error is returned
    /// after the rest have been tried; re-running settles only what is still pending.
    pub async fn settle_commissions(&self, purchaser_id: Uuid, level: &Level) -> Result<SettlementSummary> {
        let pending = self.referral_repo.find_pending_for_referred(purchaser_id).await?;
        let mut summary = SettlementSummary::new(purchaser_id, level.level_number);
        let mut first_error = None;

        for entry in pending {
            match self.settle_entry(&entry, level).await {
                Ok(Some(settled)) => {
                    summary.total_paid += settled.amount;
                    get_metrics().record_commission_settled(settled.tier.as_str());
                    summary.settled.push(settled);
                }
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        entry_id = %entry.id,
                        referrer_id = %entry.referrer_id,
                        tier = entry.tier.as_str(),
                        error = %e,
                        "Failed to settle commission"
                    );
                    get_metrics().record_commission_failed(entry.tier.as_str());
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!(
            purchaser_id = %purchaser_id,
            level_number = level.level_number,
            settled = summary.settled.len(),
            skipped = summary.skipped,
            total_paid = %summary.total_paid,
            "Commission settlement finished"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Loads `level_number` and settles against it.
    pub async fn settle_for_level(&self, purchaser_id: Uuid, level_number: i32) -> Result<SettlementSummary> {
        let level = self
            .level_repo
            .find(level_number)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Level {} not found", level_number)))?;

        self.settle_commissions(purchaser_id, &level).await
    }

    /// Settles one entry. Returns None if the entry was no longer pending.
    async fn settle_entry(
        &self,
        entry: &CommissionHistoryEntry,
        level: &Level,
    ) -> Result<Option<CommissionHistoryEntry>> {
        let rate = level.commission_rate(entry.tier);
        let amount = commission_amount(level.investment_amount, rate);

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let Some(completed) = ReferralRepository::complete_history(
            &mut tx,
            entry.id,
            amount,
            rate,
            level.investment_amount,
            level.level_number,
        )
        .await?
        else {
            tx.rollback().await.map_err(AppError::Database)?;
            return Ok(None);
        };

        if amount > Decimal::ZERO {
            let reference = LedgerReference::new(ReferenceType::Commission, Some(entry.id)).with_description(
                format!("Tier {} commission on level {} purchase", entry.tier.as_str(), level.level_number),
            );
            Ledger::credit_main_wallet(&mut tx, entry.referrer_id, amount, &reference).await?;
            ReferralRepository::add_earnings(&mut tx, entry.referral_id, amount).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;

        Ok(Some(completed))
    }
}
