mod common;

use commission_engine::error::AppError;
use commission_engine::models::{EntryKind, ReferenceType, WithdrawalMethod, WithdrawalSettings, WithdrawalStatus};
use commission_engine::providers::{PayoutRails, PayoutReceipt, PayoutStatus, ProviderError};
use commission_engine::repositories::{LedgerRepository, WithdrawalRepository};
use commission_engine::services::{UsdWalletService, WithdrawalRequest, WithdrawalService};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn crypto_request(amount_inr: Decimal) -> WithdrawalRequest {
    WithdrawalRequest {
        amount_inr,
        method: Some(WithdrawalMethod::Crypto),
        ..WithdrawalRequest::default()
    }
}

fn settings_with_trx_minimum(minimum: Decimal) -> WithdrawalSettings {
    let mut settings = WithdrawalSettings::default();
    settings.crypto_network_minimums.0.insert("TRX".to_string(), minimum);
    settings
}

#[tokio::test]
async fn test_create_reserves_funds() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;

    let withdrawal = WithdrawalService::new(pool.clone())
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(withdrawal.amount_usd, dec!(100));
    assert_eq!(withdrawal.net_amount_usd, dec!(99));
    assert_eq!(withdrawal.exchange_rate, dec!(83));
    assert_eq!(withdrawal.destination, "TXyz1234567890abcdef");
    assert_eq!(withdrawal.crypto_network.as_deref(), Some("TRX"));
    assert_eq!(withdrawal.coin.as_deref(), Some("USDT"));

    let wallet = UsdWalletService::new(pool.clone()).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, Decimal::ZERO);
    assert_eq!(wallet.balance_usd, Decimal::ZERO);

    let rows = LedgerRepository::new(pool)
        .find_usd_wallet_transactions_by_reference(withdrawal.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, EntryKind::Debit);
    assert_eq!(rows[0].reference_type, ReferenceType::Withdrawal);
    assert_eq!(rows[0].amount_inr, dec!(8300));
}

#[tokio::test]
async fn test_create_with_insufficient_balance() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(500), &settings).await;

    let result = WithdrawalService::new(pool.clone())
        .create(wallet.user_id, &crypto_request(dec!(600)), &settings)
        .await;
    assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));

    let wallet = UsdWalletService::new(pool).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, dec!(500));
}

#[tokio::test]
async fn test_concurrent_creates_cannot_overdraw() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool.clone());
    let request = crypto_request(dec!(8300));

    let (a, b) = tokio::join!(
        service.create(wallet.user_id, &request, &settings),
        service.create(wallet.user_id, &request, &settings),
    );

    assert!(a.is_ok() ^ b.is_ok());
    let rejected = if a.is_ok() { b } else { a };
    assert!(matches!(rejected, Err(AppError::InsufficientFunds { .. })));

    let wallet = UsdWalletService::new(pool).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, Decimal::ZERO);
    assert_eq!(service.list_for_user(wallet.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_racing_funding_keeps_both() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    common::set_main_wallet(&pool, wallet.user_id, dec!(830)).await;
    let wallets = UsdWalletService::new(pool.clone());
    let withdrawals = WithdrawalService::new(pool.clone());
    let request = crypto_request(dec!(8300));

    let (funding, withdrawal) = tokio::join!(
        wallets.fund_from_main_wallet(wallet.user_id, dec!(830), &settings),
        withdrawals.create(wallet.user_id, &request, &settings),
    );
    tokio_test::assert_ok!(funding);
    tokio_test::assert_ok!(withdrawal);

    let wallet = wallets.find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, dec!(830));
    assert_eq!(wallet.balance_usd, dec!(10));
    assert_eq!(common::main_wallet(&pool, wallet.user_id).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_create_without_wallet_is_not_found() {
    let Some(pool) = common::setup_test_db().await else { return };
    let user = common::create_user(&pool).await;

    let result = WithdrawalService::new(pool)
        .create(user.id, &crypto_request(dec!(500)), &WithdrawalSettings::default())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_approve_success_completes_withdrawal() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool.clone());
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_dispatch()
        .withf(|i| i.amount_usd == dec!(99) && i.network.as_deref() == Some("TRX"))
        .times(1)
        .returning(|_| {
            Ok(PayoutReceipt {
                reference: "wd_ref_001".to_string(),
            })
        });
    let rails = common::rails_with(rail);

    let completed = service.approve(withdrawal.id, "admin-1", &rails).await.unwrap();
    assert_eq!(completed.status, WithdrawalStatus::Completed);
    assert_eq!(completed.provider_reference.as_deref(), Some("wd_ref_001"));
    assert_eq!(completed.processed_by.as_deref(), Some("admin-1"));
    assert!(completed.processed_at.is_some());

    let wallet = UsdWalletService::new(pool).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, Decimal::ZERO);
    assert_eq!(wallet.total_withdrawn_usd, dec!(100));
}

#[tokio::test]
async fn test_provider_failure_returns_funds() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = settings_with_trx_minimum(dec!(5));
    let wallet = common::create_funded_wallet(&pool, dec!(500), &settings).await;
    let service = WithdrawalService::new(pool.clone());
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(500)), &settings)
        .await
        .unwrap();

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_dispatch().times(1).returning(|_| {
        Err(ProviderError::Api {
            status: 400,
            message: "Insufficient balance".to_string(),
        })
    });
    let rails = common::rails_with(rail);

    let failed = service.approve(withdrawal.id, "admin-1", &rails).await.unwrap();
    assert_eq!(failed.status, WithdrawalStatus::Failed);
    assert!(failed.remarks.as_deref().unwrap().contains("Insufficient balance"));

    let wallet = UsdWalletService::new(pool.clone()).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, dec!(500));
    assert_eq!(wallet.balance_usd, dec!(6.02));
    assert_eq!(wallet.total_withdrawn_usd, Decimal::ZERO);

    let mut rows = LedgerRepository::new(pool)
        .find_usd_wallet_transactions_by_reference(withdrawal.id)
        .await
        .unwrap();
    rows.sort_by_key(|r| r.kind == EntryKind::Credit);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].kind, EntryKind::Debit);
    assert_eq!(rows[1].kind, EntryKind::Credit);
    assert_eq!(rows[1].reference_type, ReferenceType::WithdrawalRefund);
    assert_eq!(rows[1].amount_inr, dec!(500));
}

#[tokio::test]
async fn test_provider_timeout_fails_withdrawal() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool.clone());
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    let rails = PayoutRails::new(Duration::from_millis(100))
        .with_rail(Arc::new(common::StalledRail(WithdrawalMethod::Crypto)));

    let failed = service.approve(withdrawal.id, "admin-1", &rails).await.unwrap();
    assert_eq!(failed.status, WithdrawalStatus::Failed);
    assert!(failed.remarks.as_deref().unwrap().contains("timed out"));

    let wallet = UsdWalletService::new(pool).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, dec!(8300));
}

#[tokio::test]
async fn test_second_approve_is_rejected() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool.clone());
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_dispatch().times(1).returning(|_| {
        Ok(PayoutReceipt {
            reference: "wd_ref_002".to_string(),
        })
    });
    let rails = common::rails_with(rail);

    service.approve(withdrawal.id, "admin-1", &rails).await.unwrap();
    let result = service.approve(withdrawal.id, "admin-2", &rails).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    let wallet = UsdWalletService::new(pool).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.total_withdrawn_usd, dec!(100));
}

#[tokio::test]
async fn test_approve_without_rail_leaves_withdrawal_pending() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(830), &settings).await;
    let service = WithdrawalService::new(pool);
    let request = WithdrawalRequest {
        amount_inr: dec!(830),
        method: Some(WithdrawalMethod::BankTransfer),
        ..WithdrawalRequest::default()
    };
    let withdrawal = service.create(wallet.user_id, &request, &settings).await.unwrap();

    let rails = common::rails_with(common::mock_rail(WithdrawalMethod::Crypto));
    let result = service.approve(withdrawal.id, "admin-1", &rails).await;
    assert!(matches!(
        result,
        Err(AppError::Provider(ProviderError::NotConfigured(WithdrawalMethod::BankTransfer)))
    ));

    let withdrawal = service.get(withdrawal.id).await.unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
}

#[tokio::test]
async fn test_reject_refunds_at_captured_rate() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;

    let later = WithdrawalSettings {
        exchange_rate: dec!(84),
        ..WithdrawalSettings::default()
    };
    let service = WithdrawalService::new(pool.clone());
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &later)
        .await
        .unwrap();
    assert_eq!(withdrawal.exchange_rate, dec!(84));

    let rejected = service
        .reject(withdrawal.id, "Destination failed compliance review", "admin-1")
        .await
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Destination failed compliance review")
    );

    let rows = LedgerRepository::new(pool.clone())
        .find_usd_wallet_transactions_by_reference(withdrawal.id)
        .await
        .unwrap();
    let refund = rows.iter().find(|r| r.kind == EntryKind::Credit).unwrap();
    assert_eq!(refund.exchange_rate, dec!(84));
    assert_eq!(refund.amount_inr, dec!(8300));

    let wallet = UsdWalletService::new(pool).find(wallet.user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, dec!(8300));
    assert_eq!(wallet.last_exchange_rate, dec!(84));
    assert_eq!(wallet.balance_usd, dec!(98.81));
}

#[tokio::test]
async fn test_reject_requires_reason() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool);
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    let result = service.reject(withdrawal.id, "   ", "admin-1").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(
        service.get(withdrawal.id).await.unwrap().status,
        WithdrawalStatus::Pending
    );
}

#[tokio::test]
async fn test_reject_after_completion_is_invalid() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool);
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_dispatch().returning(|_| {
        Ok(PayoutReceipt {
            reference: "wd_ref_003".to_string(),
        })
    });
    service
        .approve(withdrawal.id, "admin-1", &common::rails_with(rail))
        .await
        .unwrap();

    let result = service.reject(withdrawal.id, "Too late", "admin-1").await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

/// Creates a withdrawal and leaves it PROCESSING as if the process died mid-dispatch.
async fn interrupted_withdrawal(pool: &sqlx::PgPool) -> (WithdrawalService, uuid::Uuid, uuid::Uuid) {
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool.clone());
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    WithdrawalRepository::new(pool.clone())
        .claim_for_processing(withdrawal.id, "admin-1")
        .await
        .unwrap()
        .expect("withdrawal should be claimable");

    (service, withdrawal.id, wallet.user_id)
}

#[tokio::test]
async fn test_reconcile_completed_at_provider() {
    let Some(pool) = common::setup_test_db().await else { return };
    let (service, id, user_id) = interrupted_withdrawal(&pool).await;

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_status().times(1).returning(|_| {
        Ok(PayoutStatus::Completed {
            reference: "wd_ref_late".to_string(),
        })
    });
    rail.expect_dispatch().never();

    let completed = service.reconcile(id, &common::rails_with(rail)).await.unwrap();
    assert_eq!(completed.status, WithdrawalStatus::Completed);
    assert_eq!(completed.provider_reference.as_deref(), Some("wd_ref_late"));

    let wallet = UsdWalletService::new(pool).find(user_id).await.unwrap();
    assert_eq!(wallet.total_withdrawn_usd, dec!(100));
}

#[tokio::test]
async fn test_reconcile_still_pending_changes_nothing() {
    let Some(pool) = common::setup_test_db().await else { return };
    let (service, id, _) = interrupted_withdrawal(&pool).await;

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_status().returning(|_| Ok(PayoutStatus::Pending));

    let withdrawal = service.reconcile(id, &common::rails_with(rail)).await.unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Processing);
}

#[tokio::test]
async fn test_reconcile_unknown_at_provider_returns_funds() {
    let Some(pool) = common::setup_test_db().await else { return };
    let (service, id, user_id) = interrupted_withdrawal(&pool).await;

    let mut rail = common::mock_rail(WithdrawalMethod::Crypto);
    rail.expect_status().returning(|_| Ok(PayoutStatus::NotFound));

    let failed = service.reconcile(id, &common::rails_with(rail)).await.unwrap();
    assert_eq!(failed.status, WithdrawalStatus::Failed);
    assert_eq!(failed.remarks.as_deref(), Some("Payout not found at provider"));

    let wallet = UsdWalletService::new(pool).find(user_id).await.unwrap();
    assert_eq!(wallet.balance_inr, dec!(8300));
}

#[tokio::test]
async fn test_reconcile_requires_processing() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(8300), &settings).await;
    let service = WithdrawalService::new(pool);
    let withdrawal = service
        .create(wallet.user_id, &crypto_request(dec!(8300)), &settings)
        .await
        .unwrap();

    let rails = common::rails_with(common::mock_rail(WithdrawalMethod::Crypto));
    let result = service.reconcile(withdrawal.id, &rails).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_list_for_user() {
    let Some(pool) = common::setup_test_db().await else { return };
    let settings = WithdrawalSettings::default();
    let wallet = common::create_funded_wallet(&pool, dec!(2000), &settings).await;
    let service = WithdrawalService::new(pool);

    service
        .create(wallet.user_id, &crypto_request(dec!(1000)), &settings)
        .await
        .unwrap();
    service
        .create(wallet.user_id, &crypto_request(dec!(1000)), &settings)
        .await
        .unwrap();

    let withdrawals = service.list_for_user(wallet.user_id).await.unwrap();
    assert_eq!(withdrawals.len(), 2);
    assert!(withdrawals.iter().all(|w| w.user_id == wallet.user_id));
}
