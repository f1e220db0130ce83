use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the commission and settlement engine.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_user_registered(&self, referred: bool) {
        counter!("commission_users_registered_total", "referred" => referred.to_string()).increment(1);
    }

    pub fn record_referral_edges_created(&self, tier: &str, count: u64) {
        counter!("commission_referral_edges_total", "tier" => tier.to_string()).increment(count);
    }

    pub fn record_level_purchased(&self, level_number: i32) {
        counter!("commission_level_purchases_total", "level" => level_number.to_string()).increment(1);
    }

    pub fn record_commission_settled(&self, tier: &str) {
        counter!("commission_settlements_total", "tier" => tier.to_string()).increment(1);
    }

    pub fn record_commission_failed(&self, tier: &str) {
        counter!("commission_settlements_failed_total", "tier" => tier.to_string()).increment(1);
    }

    pub fn record_ledger_write_latency(&self, duration_ms: f64) {
        histogram!("commission_ledger_write_duration_ms").record(duration_ms);
    }

    pub fn record_wallet_funded(&self) {
        counter!("commission_wallet_fundings_total").increment(1);
    }

    pub fn record_withdrawal_created(&self, method: &str) {
        counter!("commission_withdrawals_created_total", "method" => method.to_string()).increment(1);
    }

    pub fn record_withdrawal_completed(&self, method: &str) {
        counter!("commission_withdrawals_completed_total", "method" => method.to_string()).increment(1);
    }

    pub fn record_withdrawal_failed(&self, method: &str, reason: &str) {
        counter!("commission_withdrawals_failed_total", "method" => method.to_string(), "reason" => reason.to_string()).increment(1);
    }

    pub fn record_withdrawal_rejected(&self, method: &str) {
        counter!("commission_withdrawals_rejected_total", "method" => method.to_string()).increment(1);
    }

    pub fn record_provider_call(&self, rail: &str, operation: &str, duration_ms: f64, success: bool) {
        counter!("commission_provider_calls_total", "rail" => rail.to_string(), "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("commission_provider_call_duration_ms", "rail" => rail.to_string(), "operation" => operation.to_string()).record(duration_ms);
    }

    pub fn record_outbox_enqueued(&self, kind: &str) {
        counter!("commission_outbox_enqueued_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_outbox_processed(&self, kind: &str, success: bool) {
        counter!("commission_outbox_processed_total", "kind" => kind.to_string(), "success" => success.to_string()).increment(1);
    }

    pub fn record_outbox_dead(&self, kind: &str) {
        counter!("commission_outbox_dead_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn set_outbox_backlog(&self, count: i64) {
        gauge!("commission_outbox_backlog").set(count as f64);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }

    pub fn record_db_query(&self, query_type: &str, duration_ms: f64, success: bool) {
        counter!("db_queries_total", "type" => query_type.to_string(), "success" => success.to_string()).increment(1);
        histogram!("db_query_duration_ms", "type" => query_type.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
///
/// Installs the global recorder on first call; later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();

    METRICS.get_or_init(Metrics::new);

    Ok(handle)
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!("commission_users_registered_total", Unit::Count, "Total number of registered users");
    describe_counter!("commission_referral_edges_total", Unit::Count, "Total number of referral edges created");
    describe_counter!("commission_level_purchases_total", Unit::Count, "Total number of level purchases");
    describe_counter!("commission_settlements_total", Unit::Count, "Total number of commissions settled");
    describe_counter!("commission_settlements_failed_total", Unit::Count, "Total number of commission settlements that failed");
    describe_histogram!("commission_ledger_write_duration_ms", Unit::Milliseconds, "Ledger write latency in milliseconds");

    describe_counter!("commission_wallet_fundings_total", Unit::Count, "Total number of USD wallet fundings");
    describe_counter!("commission_withdrawals_created_total", Unit::Count, "Total number of withdrawals requested");
    describe_counter!("commission_withdrawals_completed_total", Unit::Count, "Total number of withdrawals paid out");
    describe_counter!("commission_withdrawals_failed_total", Unit::Count, "Total number of withdrawals failed at the provider");
    describe_counter!("commission_withdrawals_rejected_total", Unit::Count, "Total number of withdrawals rejected by an administrator");

    describe_counter!("commission_provider_calls_total", Unit::Count, "Total payout provider calls");
    describe_histogram!("commission_provider_call_duration_ms", Unit::Milliseconds, "Payout provider call latency in milliseconds");

    describe_counter!("commission_outbox_enqueued_total", Unit::Count, "Total outbox events enqueued");
    describe_counter!("commission_outbox_processed_total", Unit::Count, "Total outbox events processed");
    describe_counter!("commission_outbox_dead_total", Unit::Count, "Total outbox events given up on");
    describe_gauge!("commission_outbox_backlog", Unit::Count, "Outbox events awaiting processing");

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!("http_request_duration_ms", Unit::Milliseconds, "HTTP request latency in milliseconds");

    describe_counter!("db_queries_total", Unit::Count, "Total database queries");
    describe_histogram!("db_query_duration_ms", Unit::Milliseconds, "Database query latency in milliseconds");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
