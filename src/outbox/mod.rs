//! Durable retry of best-effort side effects.
//!
//! Signup and purchase run referral and commission bookkeeping in-line. When that fails
//! the failure is recorded here as an [`OutboxEvent`] and the [`OutboxWorker`] re-runs
//! it later. Both side effects are idempotent, so a retry never double-applies.

pub mod worker;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::{CommissionSettlementPayload, OutboxEvent, OutboxKind, ReferralChainPayload};
use crate::observability::get_metrics;
use crate::repositories::OutboxRepository;
use crate::services::{CommissionProcessor, ReferralChainBuilder};

pub use worker::{OutboxWorker, OutboxWorkerConfig};

/// Re-runs the side effect an outbox event describes.
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    /// Returns Ok(()) once the side effect has been applied.
    async fn handle(&self, event: &OutboxEvent) -> Result<()>;

    /// Called when an event has exhausted its attempts.
    async fn on_dead(&self, event: &OutboxEvent, error: &str) {
        tracing::error!(
            event_id = %event.id,
            kind = ?event.kind,
            attempts = event.attempts,
            error = error,
            "Outbox event abandoned"
        );
    }
}

/// Dispatches outbox events to the referral chain builder and commission processor.
pub struct SideEffectHandler {
    chain_builder: ReferralChainBuilder,
    commission_processor: CommissionProcessor,
}

impl SideEffectHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            chain_builder: ReferralChainBuilder::new(pool.clone()),
            commission_processor: CommissionProcessor::new(pool),
        }
    }
}

#[async_trait]
impl OutboxHandler for SideEffectHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<()> {
        match event.kind {
            OutboxKind::ReferralChain => {
                let payload: ReferralChainPayload = decode(event)?;
                self.chain_builder
                    .build(payload.new_user_id, Some(payload.direct_referrer_id))
                    .await?;
            }
            OutboxKind::CommissionSettlement => {
                let payload: CommissionSettlementPayload = decode(event)?;
                self.commission_processor
                    .settle_for_level(payload.purchaser_id, payload.level_number)
                    .await?;
            }
        }
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &OutboxEvent) -> Result<T> {
    serde_json::from_value(event.payload.clone()).map_err(|e| {
        AppError::Internal(anyhow::anyhow!(
            "Invalid payload for outbox event {}: {}",
            event.id,
            e
        ))
    })
}

/// Records a failed side effect for retry. If even that fails the failure is logged,
/// since the caller's primary operation has already committed.
pub async fn defer(repo: &OutboxRepository, event: serde_json::Result<OutboxEvent>, cause: &AppError) {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, cause = %cause, "Failed to encode outbox event");
            return;
        }
    };

    let kind = event.kind;
    match repo.enqueue(&event).await {
        Ok(stored) => {
            get_metrics().record_outbox_enqueued(kind_label(kind));
            tracing::warn!(
                event_id = %stored.id,
                kind = ?kind,
                cause = %cause,
                "Side effect deferred to outbox"
            );
        }
        Err(e) => {
            tracing::error!(
                kind = ?kind,
                cause = %cause,
                error = %e,
                payload = %event.payload,
                "Failed to record outbox event"
            );
        }
    }
}

pub(crate) fn kind_label(kind: OutboxKind) -> &'static str {
    match kind {
        OutboxKind::ReferralChain => "referral_chain",
        OutboxKind::CommissionSettlement => "commission_settlement",
    }
}
