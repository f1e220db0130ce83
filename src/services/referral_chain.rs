use crate::error::{AppError, Result};
use crate::models::referral::extend_chain;
use crate::models::{CommissionHistoryEntry, ReferralEdge, ReferralTier};
use crate::observability::get_metrics;
use crate::repositories::{ReferralRepository, UserRepository};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Edges and pending history rows written by one chain build.
/// Empty when the signup was organic or the chain already existed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferralChainOutcome {
    pub edges: Vec<ReferralEdge>,
    pub history: Vec<CommissionHistoryEntry>,
}

impl ReferralChainOutcome {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Creates the tier A, B and C referral edges for a new user.
pub struct ReferralChainBuilder {
    pool: PgPool,
}

impl ReferralChainBuilder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds the referral chain for `new_user_id` under `direct_referrer_id`.
    ///
    /// The direct referrer becomes the tier-A ancestor; each further tier is the
    /// referrer of the previous ancestor's tier-A edge. All writes happen in one
    /// transaction. Edges that already exist are skipped along with their counters and
    /// history, so rebuilding a chain is a no-op.
    pub async fn build(
        &self,
        new_user_id: Uuid,
        direct_referrer_id: Option<Uuid>,
    ) -> Result<ReferralChainOutcome> {
        let Some(direct_referrer_id) = direct_referrer_id else {
            tracing::debug!(new_user_id = %new_user_id, "Organic signup, no referral chain to build");
            return Ok(ReferralChainOutcome::default());
        };

        if direct_referrer_id == new_user_id {
            return Err(AppError::Validation("A user cannot refer themselves".to_string()));
        }

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        if UserRepository::lock_by_id(&mut tx, new_user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", new_user_id)));
        }

        let mut outcome = ReferralChainOutcome::default();
        let mut chain = vec![direct_referrer_id, new_user_id];
        let mut ancestor = Some(direct_referrer_id);

        for tier in ReferralTier::ALL {
            let Some(referrer_id) = ancestor else { break };

            if UserRepository::lock_by_id(&mut tx, referrer_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Referrer {} not found", referrer_id)));
            }

            let edge = ReferralEdge::new(referrer_id, new_user_id, tier, chain.clone());
            if let Some(edge) = ReferralRepository::insert_edge_if_absent(&mut tx, &edge).await? {
                let direct = if tier == ReferralTier::A { 1 } else { 0 };
                UserRepository::increment_referrals(&mut tx, referrer_id, direct, 1).await?;

                let pending = CommissionHistoryEntry::pending_for(&edge);
                if let Some(entry) = ReferralRepository::insert_pending_history(&mut tx, &pending).await? {
                    outcome.history.push(entry);
                }
                get_metrics().record_referral_edges_created(tier.as_str(), 1);
                outcome.edges.push(edge);
            }

            ancestor = ReferralRepository::find_direct_upline_edge(&mut tx, referrer_id)
                .await?
                .map(|upline| upline.referrer_id)
                .filter(|upline| !chain.contains(upline));

            if let Some(upline) = ancestor {
                chain = extend_chain(upline, &chain);
            }
        }

        tx.commit().await.map_err(AppError::Database)?;

        tracing::info!(
            new_user_id = %new_user_id,
            direct_referrer_id = %direct_referrer_id,
            edges_created = outcome.edges.len(),
            "Referral chain built"
        );

        Ok(outcome)
    }
}
