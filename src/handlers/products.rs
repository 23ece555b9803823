use crate::handlers::common::{
    created_response, map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::{
    errors::ApiError,
    services::catalog::{CreateProductInput, ProductFilter, ProductView, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Creates the router for catalog endpoints. Product mutation is expected
/// to be gated to admin roles by the upstream gateway.
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/featured", get(featured_products))
        .route("/:slug", get(get_product).put(update_product))
}

pub fn categories_routes() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

/// List products with filters
async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (products, total) = state
        .services
        .catalog
        .list_products(filter, pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    let views: Vec<ProductView> = products.into_iter().map(ProductView::from).collect();
    Ok(success_response(PaginatedResponse::new(
        views,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Featured products for the home page
async fn featured_products(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .featured_products(8)
        .await
        .map_err(map_service_error)?;

    let views: Vec<ProductView> = products.into_iter().map(ProductView::from).collect();
    Ok(success_response(views))
}

/// Get a product by slug
async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product_by_slug(&slug)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductView::from(product)))
}

/// Create a product
async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ProductView::from(product)))
}

/// Update a product (the path segment is the product id)
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    let product_id = id.parse::<Uuid>().map_err(|_| ApiError::BadRequest {
        message: "Invalid product id".to_string(),
    })?;

    let product = state
        .services
        .catalog
        .update_product(product_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductView::from(product)))
}

/// List active categories
async fn list_categories(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .services
        .catalog
        .list_categories()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(categories))
}
