use crate::handlers::common::{created_response, map_service_error, success_response, PaginationParams};
use crate::handlers::extract::CurrentUser;
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for the affiliate program. Referral approval and
/// payout are expected to be gated to admin roles by the upstream gateway.
pub fn affiliates_routes() -> Router<AppState> {
    Router::new()
        .route("/join", post(join_program))
        .route("/dashboard", get(dashboard))
        .route("/code/:code", get(resolve_code))
        .route("/referrals/:id/approve", post(approve_referral))
        .route("/referrals/:id/pay", post(mark_referral_paid))
}

/// Enroll the current user in the affiliate program
async fn join_program(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let affiliate = state
        .services
        .affiliate
        .join_program(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(affiliate))
}

/// The current user's affiliate dashboard
async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let dashboard = state
        .services
        .affiliate
        .dashboard(user_id, pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(dashboard))
}

/// Resolve an affiliate code to its active profile, for attributing a
/// registration to the referrer
async fn resolve_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let affiliate = state
        .services
        .affiliate
        .resolve_code(&code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(affiliate))
}

/// Approve a pending referral commission
async fn approve_referral(
    State(state): State<AppState>,
    Path(referral_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let referral = state
        .services
        .affiliate
        .approve_referral(referral_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(referral))
}

/// Pay out an approved referral commission
async fn mark_referral_paid(
    State(state): State<AppState>,
    Path(referral_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let referral = state
        .services
        .affiliate
        .mark_referral_paid(referral_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(referral))
}
