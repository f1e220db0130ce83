mod common;

use commission_engine::error::AppError;
use commission_engine::models::{CommissionStatus, ReferralTier};
use commission_engine::repositories::{LedgerRepository, ReferralRepository};
use commission_engine::services::{CommissionProcessor, LevelPurchaseService, UserService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_direct_referrer_paid_on_purchase() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());

    let referrer = users.register(None).await.unwrap().user;
    let buyer = users.register(Some(&referrer.referral_code)).await.unwrap().user;
    let level = common::create_level(&pool, dec!(1000), dec!(10), dec!(5), dec!(2)).await;
    common::set_main_wallet(&pool, buyer.id, dec!(1000)).await;

    let purchase = LevelPurchaseService::new(pool.clone())
        .purchase(buyer.id, level.level_number)
        .await
        .unwrap();

    assert_eq!(purchase.user.current_level, level.level_number);
    assert_eq!(purchase.user.main_wallet, Decimal::ZERO);
    assert!(!purchase.commissions_deferred);
    let summary = purchase.commissions.unwrap();
    assert_eq!(summary.settled.len(), 1);
    assert_eq!(summary.total_paid, dec!(100));

    assert_eq!(common::main_wallet(&pool, referrer.id).await, dec!(100));

    let history = ReferralRepository::new(pool.clone())
        .find_history_by_referred(buyer.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, CommissionStatus::Completed);
    assert_eq!(history[0].amount, dec!(100));
    assert_eq!(history[0].commission_percentage, Some(dec!(10)));
    assert_eq!(history[0].level_number, Some(level.level_number));

    let edges = ReferralRepository::new(pool.clone())
        .find_edges_by_referrer(referrer.id)
        .await
        .unwrap();
    assert_eq!(edges[0].total_earnings, dec!(100));

    let audit = LedgerRepository::new(pool)
        .find_main_wallet_transactions(referrer.id)
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].balance_before, Decimal::ZERO);
    assert_eq!(audit[0].balance_after, dec!(100));
}

#[tokio::test]
async fn test_three_tiers_paid_at_their_rates() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());

    let root = users.register(None).await.unwrap().user;
    let u1 = users.register(Some(&root.referral_code)).await.unwrap().user;
    let u2 = users.register(Some(&u1.referral_code)).await.unwrap().user;
    let buyer = users.register(Some(&u2.referral_code)).await.unwrap().user;

    let level = common::create_level(&pool, dec!(2000), dec!(10), dec!(5), dec!(2.5)).await;
    common::set_main_wallet(&pool, buyer.id, dec!(2500)).await;

    let purchase = LevelPurchaseService::new(pool.clone())
        .purchase(buyer.id, level.level_number)
        .await
        .unwrap();
    assert_eq!(purchase.user.main_wallet, dec!(500));
    assert_eq!(purchase.commissions.unwrap().total_paid, dec!(350));

    assert_eq!(common::main_wallet(&pool, u2.id).await, dec!(200));
    assert_eq!(common::main_wallet(&pool, u1.id).await, dec!(100));
    assert_eq!(common::main_wallet(&pool, root.id).await, dec!(50));
}

#[tokio::test]
async fn test_commission_pays_once_per_relationship() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());
    let purchases = LevelPurchaseService::new(pool.clone());

    let referrer = users.register(None).await.unwrap().user;
    let buyer = users.register(Some(&referrer.referral_code)).await.unwrap().user;

    let mut levels = vec![
        common::create_level(&pool, dec!(500), dec!(10), Decimal::ZERO, Decimal::ZERO).await,
        common::create_level(&pool, dec!(500), dec!(10), Decimal::ZERO, Decimal::ZERO).await,
    ];
    levels.sort_by_key(|l| l.level_number);
    common::set_main_wallet(&pool, buyer.id, dec!(1000)).await;

    let first = purchases.purchase(buyer.id, levels[0].level_number).await.unwrap();
    assert_eq!(first.commissions.unwrap().settled.len(), 1);

    let second = purchases.purchase(buyer.id, levels[1].level_number).await.unwrap();
    let summary = second.commissions.unwrap();
    assert!(summary.settled.is_empty());
    assert_eq!(summary.total_paid, Decimal::ZERO);

    assert_eq!(common::main_wallet(&pool, referrer.id).await, dec!(50));
}

#[tokio::test]
async fn test_resettling_is_a_no_op() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());

    let referrer = users.register(None).await.unwrap().user;
    let buyer = users.register(Some(&referrer.referral_code)).await.unwrap().user;
    let level = common::create_level(&pool, dec!(1000), dec!(10), dec!(5), dec!(2)).await;
    common::set_main_wallet(&pool, buyer.id, dec!(1000)).await;

    LevelPurchaseService::new(pool.clone())
        .purchase(buyer.id, level.level_number)
        .await
        .unwrap();

    let again = CommissionProcessor::new(pool.clone())
        .settle_for_level(buyer.id, level.level_number)
        .await
        .unwrap();
    assert!(again.settled.is_empty());
    assert_eq!(common::main_wallet(&pool, referrer.id).await, dec!(100));
}

#[tokio::test]
async fn test_zero_rate_completes_without_credit() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());

    let root = users.register(None).await.unwrap().user;
    let u1 = users.register(Some(&root.referral_code)).await.unwrap().user;
    let buyer = users.register(Some(&u1.referral_code)).await.unwrap().user;
    let level = common::create_level(&pool, dec!(1000), dec!(10), Decimal::ZERO, Decimal::ZERO).await;
    common::set_main_wallet(&pool, buyer.id, dec!(1000)).await;

    LevelPurchaseService::new(pool.clone())
        .purchase(buyer.id, level.level_number)
        .await
        .unwrap();

    let history = ReferralRepository::new(pool.clone())
        .find_history_by_referred(buyer.id)
        .await
        .unwrap();
    let tier_b = history.iter().find(|h| h.tier == ReferralTier::B).unwrap();
    assert_eq!(tier_b.status, CommissionStatus::Completed);
    assert_eq!(tier_b.amount, Decimal::ZERO);

    assert_eq!(common::main_wallet(&pool, root.id).await, Decimal::ZERO);
    let audit = LedgerRepository::new(pool)
        .find_main_wallet_transactions(root.id)
        .await
        .unwrap();
    assert!(audit.is_empty());
}

#[tokio::test]
async fn test_purchase_with_insufficient_funds_changes_nothing() {
    let Some(pool) = common::setup_test_db().await else { return };
    let users = UserService::new(pool.clone());

    let referrer = users.register(None).await.unwrap().user;
    let buyer = users.register(Some(&referrer.referral_code)).await.unwrap().user;
    let level = common::create_level(&pool, dec!(1000), dec!(10), dec!(5), dec!(2)).await;
    common::set_main_wallet(&pool, buyer.id, dec!(999)).await;

    let result = LevelPurchaseService::new(pool.clone())
        .purchase(buyer.id, level.level_number)
        .await;
    assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));

    let buyer = users.get(buyer.id).await.unwrap();
    assert_eq!(buyer.current_level, 0);
    assert_eq!(buyer.main_wallet, dec!(999));

    let history = ReferralRepository::new(pool.clone())
        .find_history_by_referred(buyer.id)
        .await
        .unwrap();
    assert!(history.iter().all(|h| h.is_pending()));
    assert_eq!(common::main_wallet(&pool, referrer.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_purchase_must_be_above_current_level() {
    let Some(pool) = common::setup_test_db().await else { return };
    let buyer = common::create_user(&pool).await;
    let level = common::create_level(&pool, dec!(100), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO).await;
    common::set_main_wallet(&pool, buyer.id, dec!(1000)).await;

    let service = LevelPurchaseService::new(pool.clone());
    service.purchase(buyer.id, level.level_number).await.unwrap();

    let result = service.purchase(buyer.id, level.level_number).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(common::main_wallet(&pool, buyer.id).await, dec!(900));
}

#[tokio::test]
async fn test_unknown_level_is_not_found() {
    let Some(pool) = common::setup_test_db().await else { return };
    let buyer = common::create_user(&pool).await;

    let result = LevelPurchaseService::new(pool).purchase(buyer.id, -1).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}
