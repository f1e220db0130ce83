use crate::error::{AppError, Result};
use crate::models::Level;
use sqlx::PgPool;

/// Read access to the level catalogue. `upsert` exists for seeding.
pub struct LevelRepository {
    pool: PgPool,
}

impl LevelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, level_number: i32) -> Result<Option<Level>> {
        let row = sqlx::query_as::<_, Level>(
            r#"
            SELECT level_number, investment_amount, daily_income, a_level_commission_rate, b_level_commission_rate, c_level_commission_rate, created_at
            FROM levels
            WHERE level_number = $1
            "#,
        )
        .bind(level_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn upsert(&self, level: &Level) -> Result<Level> {
        let row = sqlx::query_as::<_, Level>(
            r#"
            INSERT INTO levels (level_number, investment_amount, daily_income, a_level_commission_rate, b_level_commission_rate, c_level_commission_rate, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (level_number) DO UPDATE
            SET investment_amount = EXCLUDED.investment_amount,
                daily_income = EXCLUDED.daily_income,
                a_level_commission_rate = EXCLUDED.a_level_commission_rate,
                b_level_commission_rate = EXCLUDED.b_level_commission_rate,
                c_level_commission_rate = EXCLUDED.c_level_commission_rate
            RETURNING level_number, investment_amount, daily_income, a_level_commission_rate, b_level_commission_rate, c_level_commission_rate, created_at
            "#,
        )
        .bind(level.level_number)
        .bind(level.investment_amount)
        .bind(level.daily_income)
        .bind(level.a_level_commission_rate)
        .bind(level.b_level_commission_rate)
        .bind(level.c_level_commission_rate)
        .bind(level.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }
}
