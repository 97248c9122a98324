use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::entities::account::AccountRole;
use crate::services::identity::AccountProfile;
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccountListQuery {
    pub role: Option<AccountRole>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/warehouses/{id}/approve",
    summary = "Approve a warehouse account",
    params(("id" = Uuid, Path, description = "Warehouse account id")),
    responses(
        (status = 200, description = "Approved", body = ApiResponse<AccountProfile>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn approve_warehouse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AccountProfile> {
    let profile = state.services.identity.approve_warehouse(id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/admin/drivers/{id}/approve",
    summary = "Approve a driver account",
    params(("id" = Uuid, Path, description = "Driver account id")),
    responses(
        (status = 200, description = "Approved", body = ApiResponse<AccountProfile>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
        (status = 404, description = "Driver not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn approve_driver(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AccountProfile> {
    let profile = state.services.identity.approve_driver(id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/accounts",
    summary = "List accounts",
    params(AccountListQuery),
    responses(
        (status = 200, description = "Accounts, newest first", body = ApiResponse<PaginatedResponse<AccountProfile>>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountListQuery>,
) -> ApiResult<PaginatedResponse<AccountProfile>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let (items, total) = state
        .services
        .identity
        .list_accounts(query.role, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}
