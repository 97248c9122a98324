use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::notification;
use crate::handlers::PageQuery;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    summary = "The caller's notifications, newest first",
    params(PageQuery),
    responses((status = 200, description = "Notifications", body = ApiResponse<PaginatedResponse<notification::Model>>)),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<PaginatedResponse<notification::Model>> {
    let (page, limit) = query.normalized();
    let (items, total) = state
        .services
        .notifications
        .list_for_account(user.user_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/notifications/{id}/read",
    summary = "Mark a notification as read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Updated", body = ApiResponse<notification::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<notification::Model> {
    let updated = state
        .services
        .notifications
        .mark_read(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
