use crate::handlers::common::{
    map_service_error, no_content_response, success_response, validate_input,
};
use crate::handlers::extract::CartIdentity;
use crate::{errors::ApiError, services::cart::AddItemInput, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item).delete(remove_item))
}

/// The current identity's cart with its items
async fn get_cart(
    State(state): State<AppState>,
    CartIdentity(owner): CartIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart_with_items(&owner)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(cart))
}

/// Add a product to the cart
async fn add_item(
    State(state): State<AppState>,
    CartIdentity(owner): CartIdentity,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let item = state
        .services
        .cart
        .add_item(
            &owner,
            AddItemInput {
                product_id: payload.product_id,
                quantity: payload.quantity,
            },
        )
        .await
        .map_err(map_service_error)?;

    Ok(success_response(item))
}

/// Overwrite a cart item's quantity
async fn update_item(
    State(state): State<AppState>,
    CartIdentity(owner): CartIdentity,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let item = state
        .services
        .cart
        .update_item_quantity(&owner, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(item))
}

/// Remove a cart item
async fn remove_item(
    State(state): State<AppState>,
    CartIdentity(owner): CartIdentity,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_item(&owner, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}
