use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::{category, product, subcategory};
use crate::errors::ServiceError;
use crate::handlers::MessageResponse;
use crate::services::catalog::{
    CategoryRequest, CreateProductRequest, ProductFilter, RestockRequest, SubcategoryRequest,
    UpdateProductRequest,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubcategoryQuery {
    pub category_id: Option<Uuid>,
}

fn paged(
    items: Vec<product::Model>,
    total: u64,
    filter: &ProductFilter,
) -> Json<ApiResponse<PaginatedResponse<product::Model>>> {
    let page = filter.page.unwrap_or(1).max(1);
    let limit = filter.limit.unwrap_or(20).clamp(1, 100);
    Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    )))
}

// ---- warehouse: categories ----

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/categories",
    summary = "Create a category",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created", body = ApiResponse<category::Model>),
        (status = 409, description = "Title already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<category::Model>>), ServiceError> {
    let created = state
        .services
        .catalog
        .create_category(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/categories",
    summary = "List the caller's categories",
    responses((status = 200, description = "Categories", body = ApiResponse<Vec<category::Model>>)),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<category::Model>> {
    let items = state.services.catalog.list_categories(user.user_id).await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    put,
    path = "/api/v1/warehouse/categories/{id}",
    summary = "Rename a category",
    params(("id" = Uuid, Path, description = "Category id")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<category::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CategoryRequest>,
) -> ApiResult<category::Model> {
    let updated = state
        .services
        .catalog
        .update_category(user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/warehouse/categories/{id}",
    summary = "Delete a category with no products",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 200, description = "Deleted", body = ApiResponse<MessageResponse>),
        (status = 409, description = "Category still has products", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<MessageResponse> {
    state
        .services
        .catalog
        .delete_category(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Category deleted",
    ))))
}

// ---- warehouse: subcategories ----

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/subcategories",
    summary = "Create a subcategory",
    request_body = SubcategoryRequest,
    responses(
        (status = 201, description = "Created", body = ApiResponse<subcategory::Model>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Title already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn create_subcategory(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<SubcategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<subcategory::Model>>), ServiceError> {
    let created = state
        .services
        .catalog
        .create_subcategory(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/subcategories",
    summary = "List the caller's subcategories",
    params(SubcategoryQuery),
    responses((status = 200, description = "Subcategories", body = ApiResponse<Vec<subcategory::Model>>)),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn list_subcategories(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SubcategoryQuery>,
) -> ApiResult<Vec<subcategory::Model>> {
    let items = state
        .services
        .catalog
        .list_subcategories(user.user_id, query.category_id)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    put,
    path = "/api/v1/warehouse/subcategories/{id}",
    summary = "Rename or move a subcategory",
    params(("id" = Uuid, Path, description = "Subcategory id")),
    request_body = SubcategoryRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<subcategory::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn update_subcategory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<SubcategoryRequest>,
) -> ApiResult<subcategory::Model> {
    let updated = state
        .services
        .catalog
        .update_subcategory(user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/warehouse/subcategories/{id}",
    summary = "Delete a subcategory with no products",
    params(("id" = Uuid, Path, description = "Subcategory id")),
    responses(
        (status = 200, description = "Deleted", body = ApiResponse<MessageResponse>),
        (status = 409, description = "Subcategory still has products", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn delete_subcategory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<MessageResponse> {
    state
        .services
        .catalog
        .delete_subcategory(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Subcategory deleted",
    ))))
}

// ---- warehouse: products ----

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/products",
    summary = "Create a product",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Created with a fresh SKU", body = ApiResponse<product::Model>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category or subcategory not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    let created = state
        .services
        .catalog
        .create_product(user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/products",
    summary = "List the caller's products, disabled included",
    params(ProductFilter),
    responses((status = 200, description = "Products", body = ApiResponse<PaginatedResponse<product::Model>>)),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<PaginatedResponse<product::Model>> {
    let (items, total) = state
        .services
        .catalog
        .list_products(user.user_id, filter.clone(), false)
        .await?;
    Ok(paged(items, total, &filter))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/products/sku/{sku}",
    summary = "Product detail by SKU",
    params(("sku" = String, Path, description = "SKU number")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<product::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn get_product_by_sku(
    State(state): State<AppState>,
    user: AuthUser,
    Path(sku): Path<String>,
) -> ApiResult<product::Model> {
    let found = state
        .services
        .catalog
        .get_product_by_sku(user.user_id, &sku)
        .await?;
    Ok(Json(ApiResponse::success(found)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/warehouse/products/{id}",
    summary = "Update product fields",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<product::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<product::Model> {
    let updated = state
        .services
        .catalog
        .update_product(user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/warehouse/products/{id}/disable",
    summary = "Hide a product from the public catalog",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Disabled", body = ApiResponse<product::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn disable_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    let updated = state
        .services
        .catalog
        .disable_product(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/warehouse/products/{id}/restock",
    summary = "Add stock to a product",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = RestockRequest,
    responses(
        (status = 200, description = "Restocked", body = ApiResponse<product::Model>),
        (status = 400, description = "Quantity must be positive", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "warehouse-catalog"
)]
pub async fn restock_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RestockRequest>,
) -> ApiResult<product::Model> {
    let updated = state
        .services
        .catalog
        .restock(user.user_id, id, request)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

// ---- public reads ----

#[utoipa::path(
    get,
    path = "/api/v1/catalog/warehouses/{warehouse_id}/categories",
    summary = "A warehouse's categories",
    params(("warehouse_id" = Uuid, Path, description = "Warehouse account id")),
    responses((status = 200, description = "Categories", body = ApiResponse<Vec<category::Model>>)),
    tag = "catalog"
)]
pub async fn public_categories(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> ApiResult<Vec<category::Model>> {
    let items = state.services.catalog.list_categories(warehouse_id).await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    get,
    path = "/api/v1/catalog/warehouses/{warehouse_id}/subcategories",
    summary = "A warehouse's subcategories",
    params(("warehouse_id" = Uuid, Path, description = "Warehouse account id"), SubcategoryQuery),
    responses((status = 200, description = "Subcategories", body = ApiResponse<Vec<subcategory::Model>>)),
    tag = "catalog"
)]
pub async fn public_subcategories(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
    Query(query): Query<SubcategoryQuery>,
) -> ApiResult<Vec<subcategory::Model>> {
    let items = state
        .services
        .catalog
        .list_subcategories(warehouse_id, query.category_id)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    get,
    path = "/api/v1/catalog/warehouses/{warehouse_id}/products",
    summary = "A warehouse's active products",
    params(("warehouse_id" = Uuid, Path, description = "Warehouse account id"), ProductFilter),
    responses((status = 200, description = "Products", body = ApiResponse<PaginatedResponse<product::Model>>)),
    tag = "catalog"
)]
pub async fn public_products(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<PaginatedResponse<product::Model>> {
    let (items, total) = state
        .services
        .catalog
        .list_products(warehouse_id, filter.clone(), true)
        .await?;
    Ok(paged(items, total, &filter))
}

#[utoipa::path(
    get,
    path = "/api/v1/catalog/products/{sku}",
    summary = "Active product by SKU",
    params(("sku" = String, Path, description = "SKU number")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<product::Model>),
        (status = 404, description = "Not found or disabled", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn public_product(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> ApiResult<product::Model> {
    let found = state.services.catalog.get_public_product(&sku).await?;
    Ok(Json(ApiResponse::success(found)))
}
