use crate::handlers::common::{created_response, map_service_error};
use crate::handlers::extract::CurrentUser;
use crate::{errors::ApiError, services::checkout::PlaceOrderInput, AppState};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(place_order))
}

/// Convert the user's cart into an order.
///
/// Address and payment validation happens in the service before the
/// transaction opens; the closed payment-method set is enforced by
/// deserialization.
async fn place_order(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .checkout
        .place_order(user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}
