use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::requests::{
    ApproveWithdrawalRequest, CreateWithdrawalRequest, FundWalletRequest, ListWithdrawalsQuery,
    PurchaseLevelRequest, RegisterUserRequest, RejectWithdrawalRequest, UpdatePreferencesRequest,
    UpdateSettingsRequest,
};
use crate::api::responses::{
    ApiError, ApiResponse, ApiResult, PurchaseResponse, RegistrationResponse, UserResponse, WalletResponse,
    WithdrawalResponse,
};
use crate::error::AppError;
use crate::models::{CommissionHistoryEntry, ReferralEdge, UsdWalletTransaction, WithdrawalSettings, WithdrawalStatus};
use crate::observability::{get_metrics, AggregatedHealth, LatencyTimer};
use crate::services::{
    LevelPurchaseService, ReconciliationReport, SettingsService, UsdWalletService, UserService, WithdrawalService,
};

use super::routes::AppState;

const PENDING_LIST_LIMIT: i64 = 100;

pub async fn health_check(State(state): State<AppState>) -> Result<Json<ApiResponse<AggregatedHealth>>, StatusCode> {
    let checker = state.health_checker.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(ApiResponse::success(checker.check_all().await)))
}

pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    let ready = match state.health_checker.as_ref() {
        Some(checker) => checker.is_ready().await,
        None => sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok(),
    };

    if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics_handle.as_ref() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Records request count and latency under the matched route template.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;
    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}

// ============================================================================
// Users
// ============================================================================

pub async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegistrationResponse>>), ApiError> {
    request.validate()?;

    let registration = UserService::new(state.pool.clone())
        .register(request.referral_code.as_deref())
        .await?;

    let response = RegistrationResponse {
        referral_edges_created: registration.referral_chain.as_ref().map(|c| c.edges.len()).unwrap_or(0),
        referral_chain_deferred: registration.chain_deferred,
        user: UserResponse::from(registration.user),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<UserResponse> {
    let user = UserService::new(state.pool.clone()).get(id).await?;
    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}

pub async fn purchase_level(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PurchaseLevelRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseResponse>>), ApiError> {
    request.validate()?;

    let purchase = LevelPurchaseService::new(state.pool.clone())
        .purchase(id, request.level_number)
        .await?;

    let (commissions_settled, commissions_paid) = purchase
        .commissions
        .as_ref()
        .map(|s| (s.settled.len(), s.total_paid))
        .unwrap_or_default();

    let response = PurchaseResponse {
        amount_debited: purchase.debit.amount,
        commissions_settled,
        commissions_paid,
        commissions_deferred: purchase.commissions_deferred,
        user: UserResponse::from(purchase.user),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn get_referrals(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<ReferralEdge>> {
    let edges = UserService::new(state.pool.clone()).referrals(id).await?;
    Ok(Json(ApiResponse::success(edges)))
}

pub async fn get_commissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<CommissionHistoryEntry>> {
    let history = UserService::new(state.pool.clone()).commissions(id).await?;
    Ok(Json(ApiResponse::success(history)))
}

// ============================================================================
// USD wallets
// ============================================================================

pub async fn get_wallet(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<WalletResponse> {
    let wallet = UsdWalletService::new(state.pool.clone()).find(user_id).await?;
    Ok(Json(ApiResponse::success(WalletResponse::from(wallet))))
}

pub async fn fund_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<FundWalletRequest>,
) -> ApiResult<WalletResponse> {
    request.validate()?;

    let settings = SettingsService::new(state.pool.clone()).current().await?;
    let funding = UsdWalletService::new(state.pool.clone())
        .fund_from_main_wallet(user_id, request.amount_inr, &settings)
        .await?;
    Ok(Json(ApiResponse::success(WalletResponse::from(funding.wallet))))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> ApiResult<WalletResponse> {
    request.validate()?;

    let settings = SettingsService::new(state.pool.clone()).current().await?;
    let wallet = UsdWalletService::new(state.pool.clone())
        .update_preferences(user_id, request.into(), &settings)
        .await?;
    Ok(Json(ApiResponse::success(WalletResponse::from(wallet))))
}

pub async fn get_wallet_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<UsdWalletTransaction>> {
    let transactions = UsdWalletService::new(state.pool.clone()).transactions(user_id).await?;
    Ok(Json(ApiResponse::success(transactions)))
}

pub async fn get_wallet_reconciliation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<ReconciliationReport> {
    let report = UsdWalletService::new(state.pool.clone())
        .verify_reconciliation(user_id)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

// ============================================================================
// Withdrawals
// ============================================================================

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WithdrawalResponse>>), ApiError> {
    request.validate()?;

    let settings = SettingsService::new(state.pool.clone()).current().await?;
    let withdrawal = WithdrawalService::new(state.pool.clone())
        .create(request.user_id, &request.to_withdrawal_request(), &settings)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(WithdrawalResponse::from(withdrawal))),
    ))
}

/// Lists a user's withdrawals, or the pending queue when no user is given.
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<ListWithdrawalsQuery>,
) -> ApiResult<Vec<WithdrawalResponse>> {
    let service = WithdrawalService::new(state.pool.clone());
    let withdrawals = match query.user_id {
        Some(user_id) => service.list_for_user(user_id).await?,
        None => {
            service
                .list_by_status(WithdrawalStatus::Pending, PENDING_LIST_LIMIT)
                .await?
        }
    };
    Ok(Json(ApiResponse::success(
        withdrawals.into_iter().map(WithdrawalResponse::from).collect(),
    )))
}

pub async fn get_withdrawal(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<WithdrawalResponse> {
    let withdrawal = WithdrawalService::new(state.pool.clone()).get(id).await?;
    Ok(Json(ApiResponse::success(WithdrawalResponse::from(withdrawal))))
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApproveWithdrawalRequest>,
) -> ApiResult<WithdrawalResponse> {
    request.validate()?;

    let withdrawal = WithdrawalService::new(state.pool.clone())
        .approve(id, &request.admin_id, &state.rails)
        .await?;
    Ok(Json(ApiResponse::success(WithdrawalResponse::from(withdrawal))))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectWithdrawalRequest>,
) -> ApiResult<WithdrawalResponse> {
    request.validate()?;

    let withdrawal = WithdrawalService::new(state.pool.clone())
        .reject(id, &request.reason, &request.admin_id)
        .await?;
    Ok(Json(ApiResponse::success(WithdrawalResponse::from(withdrawal))))
}

pub async fn reconcile_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WithdrawalResponse> {
    let withdrawal = WithdrawalService::new(state.pool.clone())
        .reconcile(id, &state.rails)
        .await?;
    Ok(Json(ApiResponse::success(WithdrawalResponse::from(withdrawal))))
}

// ============================================================================
// Settings
// ============================================================================

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<WithdrawalSettings> {
    let settings = SettingsService::new(state.pool.clone()).current().await?;
    Ok(Json(ApiResponse::success(settings)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<WithdrawalSettings> {
    request.validate()?;

    let settings = SettingsService::new(state.pool.clone())
        .update(request.to_settings(), &request.admin_id)
        .await
        .map_err(|e| match e {
            AppError::Validation(message) => AppError::Validation(format!("Invalid settings: {}", message)),
            other => other,
        })?;
    Ok(Json(ApiResponse::success(settings)))
}
