use crate::error::{AppError, Result};
use crate::models::User;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Repository for users and their main wallet.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new user.
    pub async fn create(&self, user: &User) -> Result<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.referral_code)
        .bind(user.referred_by)
        .bind(user.main_wallet)
        .bind(user.current_level)
        .bind(user.direct_referrals)
        .bind(user.total_referrals)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_referral_code(&self, referral_code: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at
            FROM users
            WHERE referral_code = $1
            "#,
        )
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn referral_code_exists(&self, referral_code: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = $1)",
        )
        .bind(referral_code)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(exists)
    }

    /// Loads a user and locks the row until the surrounding transaction ends.
    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at
            FROM users
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

    /// Writes a new main wallet balance. The caller must hold the row lock.
    pub async fn set_main_wallet(conn: &mut PgConnection, id: Uuid, balance: Decimal) -> Result<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET main_wallet = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(balance)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn set_level(conn: &mut PgConnection, id: Uuid, level_number: i32) -> Result<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET current_level = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, referral_code, referred_by, main_wallet, current_level, direct_referrals, total_referrals, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(level_number)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Adds to the referral counters of `id`.
    pub async fn increment_referrals(
        conn: &mut PgConnection,
        id: Uuid,
        direct: i32,
        total: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET direct_referrals = direct_referrals + $2,
                total_referrals = total_referrals + $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(direct)
        .bind(total)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
