use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::services::deliveries::{
    ConfirmDeliveryRequest, DeliveryView, DriverDashboard, TrackingView,
};
use crate::{ApiResponse, ApiResult, AppState};

fn with_message(view: DeliveryView, message: &str) -> ApiResult<DeliveryView> {
    let mut body = ApiResponse::success(view);
    body.message = Some(message.to_string());
    Ok(Json(body))
}

// ---- driver reads ----

#[utoipa::path(
    get,
    path = "/api/v1/delivery/pending",
    summary = "The caller's deliveries still in progress",
    responses((status = 200, description = "Deliveries", body = ApiResponse<Vec<DeliveryView>>)),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn pending(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<DeliveryView>> {
    let items = state
        .services
        .deliveries
        .pending_for_driver(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    get,
    path = "/api/v1/delivery/all-orders",
    summary = "Every delivery assigned to the caller",
    responses((status = 200, description = "Deliveries", body = ApiResponse<Vec<DeliveryView>>)),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn all_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<DeliveryView>> {
    let items = state
        .services
        .deliveries
        .all_for_driver(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    get,
    path = "/api/v1/delivery/dashboard",
    summary = "Delivery counters for the caller",
    responses((status = 200, description = "Dashboard", body = ApiResponse<DriverDashboard>)),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<DriverDashboard> {
    let stats = state
        .services
        .deliveries
        .driver_dashboard(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[utoipa::path(
    get,
    path = "/api/v1/delivery/{id}",
    summary = "Delivery detail",
    params(("id" = Uuid, Path, description = "Delivery id")),
    responses(
        (status = 200, description = "Delivery", body = ApiResponse<DeliveryView>),
        (status = 403, description = "Not the assigned driver", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<DeliveryView> {
    let view = state
        .services
        .deliveries
        .detail_for_driver(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

// ---- transitions ----

#[utoipa::path(
    patch,
    path = "/api/v1/delivery/{id}/pick-up",
    summary = "Mark the delivery as picked up",
    params(("id" = Uuid, Path, description = "Delivery id")),
    responses(
        (status = 200, description = "Picked up", body = ApiResponse<DeliveryView>),
        (status = 400, description = "Not in a state that allows pick-up", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn pick_up(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<DeliveryView> {
    let view = state.services.deliveries.pick_up(user.user_id, id).await?;
    with_message(view, "Delivery picked up")
}

#[utoipa::path(
    patch,
    path = "/api/v1/delivery/{id}/in-transit",
    summary = "Start transit and issue the delivery OTP",
    params(("id" = Uuid, Path, description = "Delivery id")),
    responses(
        (status = 200, description = "In transit; OTP issued", body = ApiResponse<DeliveryView>),
        (status = 400, description = "Not picked up yet", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn in_transit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<DeliveryView> {
    let view = state
        .services
        .deliveries
        .mark_in_transit(user.user_id, id)
        .await?;
    with_message(view, "Delivery is in transit. OTP sent to the customer.")
}

#[utoipa::path(
    patch,
    path = "/api/v1/delivery/{id}/resend-otp",
    summary = "Replace the delivery OTP",
    params(("id" = Uuid, Path, description = "Delivery id")),
    responses(
        (status = 200, description = "New OTP issued", body = ApiResponse<DeliveryView>),
        (status = 400, description = "Not in transit", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn resend_otp(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<DeliveryView> {
    let view = state
        .services
        .deliveries
        .resend_otp(user.user_id, id)
        .await?;
    with_message(view, "A new OTP has been sent to the customer.")
}

#[utoipa::path(
    patch,
    path = "/api/v1/delivery/{id}/delivered",
    summary = "Confirm handover with the customer's OTP",
    params(("id" = Uuid, Path, description = "Delivery id")),
    request_body = ConfirmDeliveryRequest,
    responses(
        (status = 200, description = "Delivered", body = ApiResponse<DeliveryView>),
        (status = 400, description = "Wrong state, missing, wrong or expired OTP", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn delivered(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ConfirmDeliveryRequest>>,
) -> ApiResult<DeliveryView> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let view = state
        .services
        .deliveries
        .confirm_delivered(user.user_id, id, request)
        .await?;
    with_message(view, "Delivery completed")
}

#[utoipa::path(
    patch,
    path = "/api/v1/delivery/{id}/cancel",
    summary = "Cancel a delivery that has not been delivered",
    params(("id" = Uuid, Path, description = "Delivery id")),
    responses(
        (status = 200, description = "Cancelled", body = ApiResponse<DeliveryView>),
        (status = 400, description = "Already delivered", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<DeliveryView> {
    let view = state.services.deliveries.cancel(user.user_id, id).await?;
    with_message(view, "Delivery canceled")
}

// ---- customer tracking ----

#[utoipa::path(
    get,
    path = "/api/v1/delivery/track/{order_number}",
    summary = "Track the delivery of one of the caller's orders",
    params(("order_number" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Tracking", body = ApiResponse<TrackingView>),
        (status = 404, description = "Order or delivery not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "delivery"
)]
pub async fn track(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> ApiResult<TrackingView> {
    let view = state
        .services
        .deliveries
        .track(user.user_id, &order_number)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}
