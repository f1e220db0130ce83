mod common;

use commission_engine::error::AppError;
use commission_engine::models::{
    CommissionSettlementPayload, OutboxEvent, OutboxKind, OutboxStatus, ReferralChainPayload, ReferralTier,
};
use commission_engine::outbox::{self, OutboxWorker, OutboxWorkerConfig, SideEffectHandler};
use commission_engine::repositories::{OutboxRepository, ReferralRepository};
use commission_engine::services::UserService;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// Tests in this file share the outbox table, so every worker may pick up any due event.
fn worker(pool: &PgPool) -> OutboxWorker {
    let config = OutboxWorkerConfig {
        poll_interval: Duration::from_millis(50),
        batch_size: 50,
        max_attempts: 1,
        base_backoff_ms: 0,
        claim_lease: Duration::from_millis(200),
    };
    OutboxWorker::new(pool.clone(), Arc::new(SideEffectHandler::new(pool.clone())), config)
}

/// Runs the worker until `id` leaves the queue.
async fn drain(pool: &PgPool, id: Uuid) -> OutboxEvent {
    let worker = worker(pool);
    let repo = OutboxRepository::new(pool.clone());

    for _ in 0..40 {
        worker.run_once().await.unwrap();
        let event = repo.find_by_id(id).await.unwrap().expect("event should exist");
        if matches!(event.status, OutboxStatus::Completed | OutboxStatus::Dead) {
            return event;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("outbox event {} was never processed", id);
}

#[tokio::test]
async fn test_deferred_referral_chain_is_built() {
    let Some(pool) = common::setup_test_db().await else { return };
    let root = common::create_user(&pool).await;
    let user = common::create_user_referred_by(&pool, Some(root.id)).await;

    let event = OutboxEvent::referral_chain(&ReferralChainPayload {
        new_user_id: user.id,
        direct_referrer_id: root.id,
    })
    .unwrap();
    let event = OutboxRepository::new(pool.clone()).enqueue(&event).await.unwrap();
    assert_eq!(event.status, OutboxStatus::Pending);

    let processed = drain(&pool, event.id).await;
    assert_eq!(processed.status, OutboxStatus::Completed);
    assert!(processed.processed_at.is_some());

    let edges = ReferralRepository::new(pool)
        .find_edges_by_referred(user.id)
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].tier, ReferralTier::A);
    assert_eq!(edges[0].referrer_id, root.id);
}

#[tokio::test]
async fn test_deferred_commission_settlement_pays_once() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());
    let referrer = users.register(None).await.unwrap().user;
    let buyer = users.register(Some(&referrer.referral_code)).await.unwrap().user;
    let level = common::create_level(&pool, dec!(1000), dec!(10), dec!(5), dec!(2)).await;

    let payload = CommissionSettlementPayload {
        purchaser_id: buyer.id,
        level_number: level.level_number,
    };
    let repo = OutboxRepository::new(pool.clone());
    let first = repo
        .enqueue(&OutboxEvent::commission_settlement(&payload).unwrap())
        .await
        .unwrap();
    let second = repo
        .enqueue(&OutboxEvent::commission_settlement(&payload).unwrap())
        .await
        .unwrap();

    assert_eq!(drain(&pool, first.id).await.status, OutboxStatus::Completed);
    assert_eq!(drain(&pool, second.id).await.status, OutboxStatus::Completed);

    assert_eq!(common::main_wallet(&pool, referrer.id).await, dec!(100));
}

/// Leaves `id` as if a worker had claimed it `claimed_ago_secs` seconds ago and never
/// recorded an outcome. A negative value puts the claim in the future.
async fn strand(pool: &PgPool, id: Uuid, claimed_ago_secs: f64) {
    sqlx::query(
        r#"
        UPDATE outbox_events
        SET status = 'PROCESSING', attempts = attempts + 1,
            claimed_at = NOW() - make_interval(secs => $2)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(claimed_ago_secs)
    .execute(pool)
    .await
    .expect("Failed to strand outbox event");
}

#[tokio::test]
async fn test_abandoned_claim_is_retried_after_lease() {
    let Some(pool) = common::setup_test_db().await else { return };
    let root = common::create_user(&pool).await;
    let user = common::create_user_referred_by(&pool, Some(root.id)).await;

    let event = OutboxEvent::referral_chain(&ReferralChainPayload {
        new_user_id: user.id,
        direct_referrer_id: root.id,
    })
    .unwrap();
    let event = OutboxRepository::new(pool.clone()).enqueue(&event).await.unwrap();
    strand(&pool, event.id, 3600.0).await;

    let processed = drain(&pool, event.id).await;
    assert_eq!(processed.status, OutboxStatus::Completed);
    assert_eq!(processed.attempts, 2);

    let edges = ReferralRepository::new(pool)
        .find_edges_by_referred(user.id)
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].referrer_id, root.id);
}

#[tokio::test]
async fn test_claim_within_lease_is_left_alone() {
    let Some(pool) = common::setup_test_db().await else { return };
    let root = common::create_user(&pool).await;
    let user = common::create_user_referred_by(&pool, Some(root.id)).await;
    let repo = OutboxRepository::new(pool.clone());

    let event = OutboxEvent::referral_chain(&ReferralChainPayload {
        new_user_id: user.id,
        direct_referrer_id: root.id,
    })
    .unwrap();
    let event = repo.enqueue(&event).await.unwrap();
    strand(&pool, event.id, -3600.0).await;

    let worker = worker(&pool);
    for _ in 0..3 {
        worker.run_once().await.unwrap();
    }

    let stored = repo.find_by_id(event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutboxStatus::Processing);
    assert_eq!(stored.attempts, 1);

    sqlx::query("DELETE FROM outbox_events WHERE id = $1")
        .bind(event.id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failing_event_goes_dead() {
    let Some(pool) = common::setup_test_db().await else { return };
    let event = OutboxEvent::new(OutboxKind::ReferralChain, serde_json::json!({ "unexpected": true }));
    let event = OutboxRepository::new(pool.clone()).enqueue(&event).await.unwrap();

    let processed = drain(&pool, event.id).await;
    assert_eq!(processed.status, OutboxStatus::Dead);
    assert!(processed.attempts >= 1);
    assert!(processed.last_error.unwrap().contains("Invalid payload"));
}

#[tokio::test]
async fn test_defer_enqueues_event() {
    let Some(pool) = common::setup_test_db().await else { return };
    let repo = OutboxRepository::new(pool.clone());
    let root = common::create_user(&pool).await;
    let user = common::create_user_referred_by(&pool, Some(root.id)).await;

    let event = OutboxEvent::referral_chain(&ReferralChainPayload {
        new_user_id: user.id,
        direct_referrer_id: root.id,
    });
    let id = event.as_ref().map(|e| e.id).unwrap();
    let cause = AppError::Validation("simulated failure".to_string());

    outbox::defer(&repo, event, &cause).await;

    let stored = repo.find_by_id(id).await.unwrap().expect("deferred event should be stored");
    assert_eq!(stored.kind, OutboxKind::ReferralChain);
    assert_eq!(stored.payload["new_user_id"], serde_json::json!(user.id));

    assert_eq!(drain(&pool, id).await.status, OutboxStatus::Completed);
}

#[tokio::test]
async fn test_worker_start_and_stop() {
    let Some(pool) = common::setup_test_db().await else { return };
    let worker = Arc::new(worker(&pool));

    let task = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.start().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(worker.is_running());

    worker.stop();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("worker should stop")
        .unwrap();
    assert!(!worker.is_running());
}
