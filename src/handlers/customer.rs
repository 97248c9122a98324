use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::{order, payment, product, shipping_address};
use crate::errors::ServiceError;
use crate::handlers::{MessageResponse, PageQuery};
use crate::services::addresses::AddressRequest;
use crate::services::cart::{AddToCartRequest, CartView};
use crate::services::orders::{CreateOrderRequest, OrderDetail};
use crate::services::payments::RecordPaymentRequest;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteRequest {
    pub product_id: Uuid,
}

// ---- addresses ----

#[utoipa::path(
    get,
    path = "/api/v1/customer/addresses",
    summary = "List saved shipping addresses",
    responses((status = 200, description = "Addresses", body = ApiResponse<Vec<shipping_address::Model>>)),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<shipping_address::Model>> {
    let items = state.services.addresses.list(user.user_id).await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/addresses",
    summary = "Save a shipping address",
    request_body = AddressRequest,
    responses(
        (status = 201, description = "Created", body = ApiResponse<shipping_address::Model>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AddressRequest>,
) -> Result<(StatusCode, Json<ApiResponse<shipping_address::Model>>), ServiceError> {
    let created = state
        .services
        .addresses
        .create(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/addresses/{id}",
    summary = "Get one shipping address",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address", body = ApiResponse<shipping_address::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn get_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<shipping_address::Model> {
    let found = state.services.addresses.get(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(found)))
}

#[utoipa::path(
    put,
    path = "/api/v1/customer/addresses/{id}",
    summary = "Replace a shipping address",
    params(("id" = Uuid, Path, description = "Address id")),
    request_body = AddressRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<shipping_address::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn update_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AddressRequest>,
) -> ApiResult<shipping_address::Model> {
    let updated = state
        .services
        .addresses
        .update(user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/addresses/{id}",
    summary = "Delete a shipping address",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Deleted", body = ApiResponse<MessageResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Address is used by an order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<MessageResponse> {
    state.services.addresses.delete(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Address deleted",
    ))))
}

// ---- cart ----

#[utoipa::path(
    get,
    path = "/api/v1/customer/cart",
    summary = "View the cart with computed totals",
    responses((status = 200, description = "Cart", body = ApiResponse<CartView>)),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn view_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartView> {
    let cart = state.services.cart.view(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/cart/add",
    summary = "Add a product to the cart or raise its quantity",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Cart after the change", body = ApiResponse<CartView>),
        (status = 400, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AddToCartRequest>,
) -> ApiResult<CartView> {
    let cart = state.services.cart.add_item(user.user_id, request).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/cart/items/{id}",
    summary = "Remove a cart line",
    params(("id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Cart after the change", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<CartView> {
    let cart = state.services.cart.remove_item(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

// ---- favourites ----

#[utoipa::path(
    get,
    path = "/api/v1/customer/favorites",
    summary = "List favourite products",
    responses((status = 200, description = "Favourites", body = ApiResponse<Vec<product::Model>>)),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<product::Model>> {
    let items = state.services.favorites.list(user.user_id).await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/favorites",
    summary = "Mark a product as favourite",
    request_body = FavoriteRequest,
    responses(
        (status = 200, description = "Added", body = ApiResponse<MessageResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn add_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<FavoriteRequest>,
) -> ApiResult<MessageResponse> {
    state
        .services
        .favorites
        .add(user.user_id, request.product_id)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Added to favorites",
    ))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customer/favorites/{product_id}",
    summary = "Remove a favourite",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Removed", body = ApiResponse<MessageResponse>),
        (status = 404, description = "Not a favourite", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> ApiResult<MessageResponse> {
    state
        .services
        .favorites
        .remove(user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Removed from favorites",
    ))))
}

// ---- orders and payment ----

#[utoipa::path(
    post,
    path = "/api/v1/customer/orders",
    summary = "Place an order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed; stock reserved and cart cleared", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Invalid input or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address or product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    let placed = state
        .services
        .orders
        .create_order(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(placed))))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/orders",
    summary = "List the caller's orders",
    params(PageQuery),
    responses((status = 200, description = "Orders", body = ApiResponse<PaginatedResponse<order::Model>>)),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    let (page, limit) = query.normalized();
    let (items, total) = state
        .services
        .orders
        .list_orders(user.user_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/customer/orders/{id}",
    summary = "Order detail with items and payment",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let detail = state.services.orders.get_order(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/customer/payment",
    summary = "Record the payment for an order",
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = ApiResponse<payment::Model>),
        (status = 400, description = "Amount or method mismatch", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already has a payment", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "customer"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<payment::Model>>), ServiceError> {
    let recorded = state
        .services
        .payments
        .record_payment(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(recorded))))
}
