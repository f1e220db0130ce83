use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

use commission_engine::models::currency::{net_of_fee, to_usd};
use commission_engine::models::level::commission_amount;
use commission_engine::models::{Level, ReferralTier, UsdWallet, WithdrawalMethod, WithdrawalSettings};
use commission_engine::observability::LatencyTimer;
use commission_engine::services::{plan_withdrawal, WithdrawalRequest};

fn benchmark_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion");
    let rate = Decimal::new(8317, 2);

    for amount in [500i64, 12_345, 499_999].iter() {
        group.bench_with_input(BenchmarkId::new("to_usd", amount), amount, |b, &amount| {
            let amount_inr = Decimal::from(amount);
            b.iter(|| black_box(to_usd(black_box(amount_inr), black_box(rate))));
        });
    }

    group.bench_function("net_of_fee", |b| {
        b.iter(|| black_box(net_of_fee(black_box(Decimal::new(60241, 2)), black_box(Decimal::ONE))));
    });

    group.finish();
}

fn benchmark_commission(c: &mut Criterion) {
    let mut group = c.benchmark_group("commission");
    let level = Level::new(3, Decimal::from(5000), Decimal::from(150)).with_commission_rates(
        Decimal::from(10),
        Decimal::from(5),
        Decimal::from(2),
    );

    group.bench_function("commission_amount", |b| {
        b.iter(|| black_box(commission_amount(black_box(Decimal::from(5000)), black_box(Decimal::new(75, 1)))));
    });

    group.bench_function("all_tiers", |b| {
        b.iter(|| {
            let total: Decimal = ReferralTier::ALL.iter().map(|tier| level.commission_for(*tier)).sum();
            black_box(total)
        });
    });

    group.finish();
}

fn benchmark_withdrawal_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("withdrawal_planning");
    group.measurement_time(Duration::from_secs(5));

    let settings = WithdrawalSettings::default();
    let rate = settings.exchange_rate;
    let mut wallet = UsdWallet::new(Uuid::new_v4(), rate);
    wallet.credit(Decimal::from(100_000), rate);
    wallet.crypto_address = Some("TXyz1234567890abcdef".to_string());
    wallet.crypto_network = Some("TRX".to_string());
    wallet.bank_payout_account_id = Some("acct_1Nv0FGQ9RKHgCVdK".to_string());

    for method in [WithdrawalMethod::Crypto, WithdrawalMethod::BankTransfer] {
        let request = WithdrawalRequest {
            amount_inr: Decimal::from(8300),
            method: Some(method),
            ..WithdrawalRequest::default()
        };
        group.bench_function(BenchmarkId::new("plan", method.as_str()), |b| {
            b.iter(|| black_box(plan_withdrawal(black_box(&wallet), black_box(&request), &settings)))
        });
    }

    group.finish();
}

fn benchmark_latency_timer(c: &mut Criterion) {
    c.bench_function("latency_timer", |b| {
        b.iter(|| {
            let timer = LatencyTimer::new();
            black_box(timer.elapsed_ms())
        });
    });
}

criterion_group!(
    benches,
    benchmark_conversion,
    benchmark_commission,
    benchmark_withdrawal_planning,
    benchmark_latency_timer,
);
criterion_main!(benches);
