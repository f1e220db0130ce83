use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Side effect recorded for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxKind {
    ReferralChain,
    CommissionSettlement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    /// Gave up after the configured number of attempts.
    Dead,
}

/// Payload for a referral chain that could not be built at signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralChainPayload {
    pub new_user_id: Uuid,
    pub direct_referrer_id: Uuid,
}

/// Payload for commissions that could not be settled after a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSettlementPayload {
    pub purchaser_id: Uuid,
    pub level_number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub kind: OutboxKind,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(kind: OutboxKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            processed_at: None,
        }
    }

    pub fn referral_chain(payload: &ReferralChainPayload) -> serde_json::Result<Self> {
        Ok(Self::new(OutboxKind::ReferralChain, serde_json::to_value(payload)?))
    }

    pub fn commission_settlement(payload: &CommissionSettlementPayload) -> serde_json::Result<Self> {
        Ok(Self::new(
            OutboxKind::CommissionSettlement,
            serde_json::to_value(payload)?,
        ))
    }
}

/// Exponential backoff: `base * 2^(attempts - 1)`, capped at one hour.
pub fn backoff_delay(base_ms: u64, attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 20) as u32;
    let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(3_600_000);
    Duration::milliseconds(delay_ms as i64)
}
