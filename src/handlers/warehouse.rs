use axum::{extract::State, http::StatusCode, Json};

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::deliveries::{AssignDeliveryRequest, DeliveryView};
use crate::services::warehouses::{AvailableDriver, WarehouseDashboard, WarehouseOrder};
use crate::{ApiResponse, ApiResult, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/orders/pending",
    summary = "Orders waiting to be assigned to a driver",
    responses((status = 200, description = "Pending orders", body = ApiResponse<Vec<WarehouseOrder>>)),
    security(("Bearer" = [])),
    tag = "warehouse"
)]
pub async fn pending_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<WarehouseOrder>> {
    let orders = state
        .services
        .warehouses
        .pending_orders(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/drivers/available",
    summary = "Approved drivers of this warehouse that are free",
    responses((status = 200, description = "Drivers", body = ApiResponse<Vec<AvailableDriver>>)),
    security(("Bearer" = [])),
    tag = "warehouse"
)]
pub async fn available_drivers(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<AvailableDriver>> {
    let drivers = state
        .services
        .warehouses
        .available_drivers(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(drivers)))
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/deliveries",
    summary = "Assign pending orders to a driver",
    request_body = AssignDeliveryRequest,
    responses(
        (status = 201, description = "Delivery created", body = ApiResponse<DeliveryView>),
        (status = 400, description = "Driver busy or orders not assignable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Driver or order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse"
)]
pub async fn assign_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AssignDeliveryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DeliveryView>>), ServiceError> {
    let delivery = state
        .services
        .deliveries
        .assign(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(delivery))))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/dashboard",
    summary = "Revenue and order counters",
    responses((status = 200, description = "Dashboard", body = ApiResponse<WarehouseDashboard>)),
    security(("Bearer" = [])),
    tag = "warehouse"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<WarehouseDashboard> {
    let stats = state.services.warehouses.dashboard(user.user_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}
