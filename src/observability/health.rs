use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{OutboxStatus, WithdrawalMethod};
use crate::providers::PayoutRails;
use crate::repositories::OutboxRepository;

const DATABASE_TIMEOUT: Duration = Duration::from_secs(5);
const DATABASE_SLOW_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Degraded components still serve traffic.
    pub fn is_serving(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health of one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: Option<f64>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms,
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    /// The worst component status wins.
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = if dependencies.iter().any(|d| d.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if dependencies.iter().any(|d| d.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }
}

/// Probes PostgreSQL, the outbox and the payout rail registry.
pub struct HealthChecker {
    pool: PgPool,
    outbox_repo: OutboxRepository,
    rails: Arc<PayoutRails>,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(pool: PgPool, rails: Arc<PayoutRails>) -> Self {
        Self {
            outbox_repo: OutboxRepository::new(pool.clone()),
            pool,
            rails,
            start_time: Instant::now(),
        }
    }

    pub async fn check_all(&self) -> AggregatedHealth {
        let dependencies = vec![
            self.check_database().await,
            self.check_outbox().await,
            self.check_payout_rails().await,
        ];

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.uptime_seconds(),
            dependencies,
        )
    }

    pub async fn check_database(&self) -> DependencyHealth {
        let start = Instant::now();

        match tokio::time::timeout(DATABASE_TIMEOUT, sqlx::query("SELECT 1").fetch_one(&self.pool)).await {
            Ok(Ok(_)) => {
                let latency = start.elapsed().as_secs_f64() * 1000.0;
                if latency > DATABASE_SLOW_MS {
                    DependencyHealth {
                        latency_ms: Some(latency),
                        ..DependencyHealth::degraded("database", "High latency detected")
                    }
                } else {
                    DependencyHealth::healthy("database", Some(latency))
                }
            }
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }

    /// Dead events need an operator, so they degrade the service.
    pub async fn check_outbox(&self) -> DependencyHealth {
        match self.outbox_repo.count_by_status(OutboxStatus::Dead).await {
            Ok(0) => DependencyHealth::healthy("outbox", None),
            Ok(dead) => DependencyHealth::degraded("outbox", format!("{} dead events", dead)),
            Err(e) => DependencyHealth::degraded("outbox", format!("Count failed: {}", e)),
        }
    }

    /// Asks every configured rail for its float. A missing or failing rail degrades the service.
    pub async fn check_payout_rails(&self) -> DependencyHealth {
        let mut problems = Vec::new();
        for method in [WithdrawalMethod::BankTransfer, WithdrawalMethod::Crypto] {
            if !self.rails.is_configured(method) {
                problems.push(format!("{} not configured", method.as_str()));
                continue;
            }
            if let Err(e) = self.rails.available_balance(method).await {
                problems.push(format!("{} balance query failed: {}", method.as_str(), e));
            }
        }

        if problems.is_empty() {
            DependencyHealth::healthy("payout_rails", None)
        } else {
            DependencyHealth::degraded("payout_rails", problems.join("; "))
        }
    }

    pub fn is_alive(&self) -> bool {
        true
    }

    /// Ready when the database answers, even slowly.
    pub async fn is_ready(&self) -> bool {
        self.check_database().await.status.is_serving()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
