use crate::error::{AppError, Result};
use crate::models::{CommissionHistoryEntry, ReferralEdge, ReferralTier};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for referral edges and their commission history.
pub struct ReferralRepository {
    pool: PgPool,
}

impl ReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Edges where `referrer_id` is the upline, ordered by tier.
    pub async fn find_edges_by_referrer(&self, referrer_id: Uuid) -> Result<Vec<ReferralEdge>> {
        let rows = sqlx::query_as::<_, ReferralEdge>(
            r#"
            SELECT id, referrer_id, referred_user_id, tier, referral_chain, total_earnings, created_at, updated_at
            FROM team_referrals
            WHERE referrer_id = $1
            ORDER BY tier, created_at
            "#,
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Edges pointing at `referred_user_id`, i.e. its uplines.
    pub async fn find_edges_by_referred(&self, referred_user_id: Uuid) -> Result<Vec<ReferralEdge>> {
        let rows = sqlx::query_as::<_, ReferralEdge>(
            r#"
            SELECT id, referrer_id, referred_user_id, tier, referral_chain, total_earnings, created_at, updated_at
            FROM team_referrals
            WHERE referred_user_id = $1
            ORDER BY tier
            "#,
        )
        .bind(referred_user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// The tier-A edge whose referred user is `referred_user_id`; its referrer is that
    /// user's direct upline.
    pub async fn find_direct_upline_edge(
        conn: &mut PgConnection,
        referred_user_id: Uuid,
    ) -> Result<Option<ReferralEdge>> {
        let row = sqlx::query_as::<_, ReferralEdge>(
            r#"
            SELECT id, referrer_id, referred_user_id, tier, referral_chain, total_earnings, created_at, updated_at
            FROM team_referrals
            WHERE referred_user_id = $1 AND tier = $2
            "#,
        )
        .bind(referred_user_id)
        .bind(ReferralTier::A)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Inserts `edge` unless one already exists for its `(referrer, referred, tier)`.
    /// Returns the inserted row, or None if it already existed.
    pub async fn insert_edge_if_absent(
        conn: &mut PgConnection,
        edge: &ReferralEdge,
    ) -> Result<Option<ReferralEdge>> {
        let row = sqlx::query_as::<_, ReferralEdge>(
            r#"
            INSERT INTO team_referrals (id, referrer_id, referred_user_id, tier, referral_chain, total_earnings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (referrer_id, referred_user_id, tier) DO NOTHING
            RETURNING id, referrer_id, referred_user_id, tier, referral_chain, total_earnings, created_at, updated_at
            "#,
        )
        .bind(edge.id)
        .bind(edge.referrer_id)
        .bind(edge.referred_user_id)
        .bind(edge.tier)
        .bind(&edge.referral_chain)
        .bind(edge.total_earnings)
        .bind(edge.created_at)
        .bind(edge.updated_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn add_earnings(conn: &mut PgConnection, referral_id: Uuid, amount: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE team_referrals
            SET total_earnings = total_earnings + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(referral_id)
        .bind(amount)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Inserts a pending history entry. At most one pending entry may exist per
    /// `(referrer, referred, tier)`; a duplicate is ignored and None is returned.
    pub async fn insert_pending_history(
        conn: &mut PgConnection,
        entry: &CommissionHistoryEntry,
    ) -> Result<Option<CommissionHistoryEntry>> {
        let row = sqlx::query_as::<_, CommissionHistoryEntry>(
            r#"
            INSERT INTO team_referral_history (id, referral_id, referrer_id, referred_user_id, tier, referral_chain, status, amount, commission_percentage, investment_amount, level_number, created_at, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (referrer_id, referred_user_id, tier) WHERE status = 'PENDING' DO NOTHING
            RETURNING id, referral_id, referrer_id, referred_user_id, tier, referral_chain, status, amount, commission_percentage, investment_amount, level_number, created_at, settled_at
            "#,
        )
        .bind(entry.id)
        .bind(entry.referral_id)
        .bind(entry.referrer_id)
        .bind(entry.referred_user_id)
        .bind(entry.tier)
        .bind(&entry.referral_chain)
        .bind(entry.status)
        .bind(entry.amount)
        .bind(entry.commission_percentage)
        .bind(entry.investment_amount)
        .bind(entry.level_number)
        .bind(entry.created_at)
        .bind(entry.settled_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Pending entries where `referred_user_id` is the purchaser, ordered by tier.
    pub async fn find_pending_for_referred(
        &self,
        referred_user_id: Uuid,
    ) -> Result<Vec<CommissionHistoryEntry>> {
        let rows = sqlx::query_as::<_, CommissionHistoryEntry>(
            r#"
            SELECT id, referral_id, referrer_id, referred_user_id, tier, referral_chain, status, amount, commission_percentage, investment_amount, level_number, created_at, settled_at
            FROM team_referral_history
            WHERE referred_user_id = $1 AND status = 'PENDING'
            ORDER BY tier
            "#,
        )
        .bind(referred_user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Commission history earned by `referrer_id`, newest first.
    pub async fn find_history_by_referrer(&self, referrer_id: Uuid) -> Result<Vec<CommissionHistoryEntry>> {
        let rows = sqlx::query_as::<_, CommissionHistoryEntry>(
            r#"
            SELECT id, referral_id, referrer_id, referred_user_id, tier, referral_chain, status, amount, commission_percentage, investment_amount, level_number, created_at, settled_at
            FROM team_referral_history
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_history_by_referred(&self, referred_user_id: Uuid) -> Result<Vec<CommissionHistoryEntry>> {
        let rows = sqlx::query_as::<_, CommissionHistoryEntry>(
            r#"
            SELECT id, referral_id, referrer_id, referred_user_id, tier, referral_chain, status, amount, commission_percentage, investment_amount, level_number, created_at, settled_at
            FROM team_referral_history
            WHERE referred_user_id = $1
            ORDER BY tier
            "#,
        )
        .bind(referred_user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Flips a pending entry to completed. Returns None if the entry was no longer pending,
    /// so concurrent settlements of one entry complete it exactly once.
    pub async fn complete_history(
        conn: &mut PgConnection,
        id: Uuid,
        amount: Decimal,
        commission_percentage: Decimal,
        investment_amount: Decimal,
        level_number: i32,
    ) -> Result<Option<CommissionHistoryEntry>> {
        let row = sqlx::query_as::<_, CommissionHistoryEntry>(
            r#"
            UPDATE team_referral_history
            SET status = 'COMPLETED',
                amount = $2,
                commission_percentage = $3,
                investment_amount = $4,
                level_number = $5,
                settled_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING id, referral_id, referrer_id, referred_user_id, tier, referral_chain, status, amount, commission_percentage, investment_amount, level_number, created_at, settled_at
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(commission_percentage)
        .bind(investment_amount)
        .bind(level_number)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
