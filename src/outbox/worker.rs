use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use super::{kind_label, OutboxHandler};
use crate::config::OutboxSettings;
use crate::error::Result;
use crate::models::outbox::backoff_delay;
use crate::models::{OutboxEvent, OutboxStatus};
use crate::observability::get_metrics;
use crate::repositories::OutboxRepository;

/// Polling and retry parameters for the outbox worker.
#[derive(Debug, Clone)]
pub struct OutboxWorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub base_backoff_ms: u64,
    /// How long a claimed event may stay processing before another worker takes it over.
    pub claim_lease: Duration,
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 20,
            max_attempts: 8,
            base_backoff_ms: 2000,
            claim_lease: Duration::from_secs(300),
        }
    }
}

impl From<&OutboxSettings> for OutboxWorkerConfig {
    fn from(settings: &OutboxSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            batch_size: settings.batch_size,
            max_attempts: settings.max_attempts,
            base_backoff_ms: settings.base_backoff_ms,
            claim_lease: Duration::from_millis(settings.claim_lease_ms),
        }
    }
}

/// What happened to one claimed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Completed,
    Rescheduled,
    Dead,
}

/// Returns true if an event that just failed its `attempts`-th try should be abandoned.
pub fn is_exhausted(attempts: i32, max_attempts: i32) -> bool {
    attempts >= max_attempts
}

/// Background loop that re-runs deferred side effects.
pub struct OutboxWorker {
    repo: OutboxRepository,
    handler: Arc<dyn OutboxHandler>,
    config: OutboxWorkerConfig,
    running: Arc<AtomicBool>,
}

impl OutboxWorker {
    pub fn new(pool: PgPool, handler: Arc<dyn OutboxHandler>, config: OutboxWorkerConfig) -> Self {
        Self {
            repo: OutboxRepository::new(pool),
            handler,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims and processes one batch of due events. Returns how many were claimed.
    pub async fn run_once(&self) -> Result<usize> {
        let lease_cutoff = Utc::now() - chrono::Duration::milliseconds(self.config.claim_lease.as_millis() as i64);
        let events = self.repo.claim_due(self.config.batch_size, lease_cutoff).await?;
        let claimed = events.len();

        // An event whose outcome could not be recorded stays claimed until its lease lapses.
        for event in events {
            match self.process(&event).await {
                Ok(outcome) => {
                    tracing::debug!(event_id = %event.id, outcome = ?outcome, "Outbox event processed")
                }
                Err(e) => tracing::error!(
                    event_id = %event.id,
                    error = %e,
                    "Failed to record outbox event outcome"
                ),
            }
        }

        if let Ok(backlog) = self.repo.count_by_status(OutboxStatus::Pending).await {
            get_metrics().set_outbox_backlog(backlog);
        }

        Ok(claimed)
    }

    async fn process(&self, event: &OutboxEvent) -> Result<EventOutcome> {
        let kind = kind_label(event.kind);

        match self.handler.handle(event).await {
            Ok(()) => {
                self.repo.mark_completed(event.id).await?;
                get_metrics().record_outbox_processed(kind, true);
                tracing::info!(event_id = %event.id, attempts = event.attempts, "Outbox event completed");
                Ok(EventOutcome::Completed)
            }
            Err(e) => {
                let error = e.to_string();
                get_metrics().record_outbox_processed(kind, false);

                if is_exhausted(event.attempts, self.config.max_attempts) {
                    self.repo.mark_dead(event.id, &error).await?;
                    get_metrics().record_outbox_dead(kind);
                    self.handler.on_dead(event, &error).await;
                    return Ok(EventOutcome::Dead);
                }

                let next_attempt_at = Utc::now() + backoff_delay(self.config.base_backoff_ms, event.attempts);
                self.repo.reschedule(event.id, &error, next_attempt_at).await?;
                tracing::warn!(
                    event_id = %event.id,
                    attempts = event.attempts,
                    next_attempt_at = %next_attempt_at,
                    error = %error,
                    "Outbox event failed, rescheduled"
                );
                Ok(EventOutcome::Rescheduled)
            }
        }
    }

    /// Runs until [`stop`](Self::stop) is called. Poll errors are logged and retried on the
    /// next tick.
    pub async fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox worker started"
        );

        while self.running.load(Ordering::SeqCst) {
            match self.run_once().await {
                Ok(claimed) if claimed as i64 >= self.config.batch_size => continue,
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Outbox worker poll failed"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        tracing::info!("Outbox worker stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Outbox worker stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
