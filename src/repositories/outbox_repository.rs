use crate::error::{AppError, Result};
use crate::models::{OutboxEvent, OutboxStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for durable outbox events.
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, event: &OutboxEvent) -> Result<OutboxEvent> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            INSERT INTO outbox_events (id, kind, payload, status, attempts, last_error, next_attempt_at, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, kind, payload, status, attempts, last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(event.id)
        .bind(event.kind)
        .bind(&event.payload)
        .bind(event.status)
        .bind(event.attempts)
        .bind(&event.last_error)
        .bind(event.next_attempt_at)
        .bind(event.created_at)
        .bind(event.processed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, kind, payload, status, attempts, last_error, next_attempt_at, created_at, processed_at
            FROM outbox_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Claims up to `limit` due events, moving them to processing and counting the attempt.
    /// A processing event claimed before `lease_cutoff` belonged to a worker that never
    /// finished it and is claimed again. Rows locked by another worker are skipped.
    pub async fn claim_due(&self, limit: i64, lease_cutoff: DateTime<Utc>) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query_as::<_, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET status = 'PROCESSING', attempts = attempts + 1, claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE (status = 'PENDING' AND next_attempt_at <= NOW())
                   OR (status = 'PROCESSING' AND COALESCE(claimed_at, next_attempt_at) < $2)
                ORDER BY next_attempt_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, kind, payload, status, attempts, last_error, next_attempt_at, created_at, processed_at
            "#,
        )
        .bind(limit)
        .bind(lease_cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn mark_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'COMPLETED', last_error = NULL, processed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Returns a failed event to pending, due again at `next_attempt_at`.
    pub async fn reschedule(&self, id: Uuid, error: &str, next_attempt_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'PENDING', last_error = $2, next_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn mark_dead(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'DEAD', last_error = $2, processed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn count_by_status(&self, status: OutboxStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(count)
    }
}
