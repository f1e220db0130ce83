use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use http::{HeaderName, Request};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::observability::HealthChecker;
use crate::providers::PayoutRails;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub rails: Arc<PayoutRails>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(pool: PgPool, rails: Arc<PayoutRails>) -> Self {
        Self {
            pool,
            rails,
            metrics_handle: None,
            health_checker: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Users
        .route("/users", post(handlers::register_user))
        .route("/users/:id", get(handlers::get_user))
        .route("/users/:id/purchases", post(handlers::purchase_level))
        .route("/users/:id/referrals", get(handlers::get_referrals))
        .route("/users/:id/commissions", get(handlers::get_commissions))
        // USD wallets
        .route("/wallets/:user_id", get(handlers::get_wallet))
        .route("/wallets/:user_id/fund", post(handlers::fund_wallet))
        .route("/wallets/:user_id/preferences", put(handlers::update_preferences))
        .route("/wallets/:user_id/transactions", get(handlers::get_wallet_transactions))
        .route("/wallets/:user_id/reconciliation", get(handlers::get_wallet_reconciliation))
        // Withdrawals
        .route(
            "/withdrawals",
            post(handlers::create_withdrawal).get(handlers::list_withdrawals),
        )
        .route("/withdrawals/:id", get(handlers::get_withdrawal))
        .route("/withdrawals/:id/approve", post(handlers::approve_withdrawal))
        .route("/withdrawals/:id/reject", post(handlers::reject_withdrawal))
        .route("/withdrawals/:id/reconcile", post(handlers::reconcile_withdrawal))
        // Settings
        .route(
            "/settings/withdrawal",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route_layer(middleware::from_fn(handlers::track_metrics))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}
