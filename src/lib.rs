//! Quick-commerce API library
//!
//! Accounts with OTP verification, warehouse catalogs, carts and orders,
//! payments, and OTP-confirmed last-mile deliveries.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    response::Json,
    routing::{delete, get, patch, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService};
use crate::entities::account::AccountRole;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Everything under `/api/v1`, with role gating per group
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{admin, auth as auth_h, catalog, customer, delivery, notifications, warehouse};

    let auth_public = Router::new()
        .route("/auth/register", post(auth_h::register_customer))
        .route("/auth/register/warehouse", post(auth_h::register_warehouse))
        .route("/auth/register/driver", post(auth_h::register_driver))
        .route("/auth/verify-otp", post(auth_h::verify_otp))
        .route("/auth/resend-otp", post(auth_h::resend_otp))
        .route("/auth/login", post(auth_h::login))
        .route("/auth/refresh", post(auth_h::refresh))
        .route("/auth/password-reset", post(auth_h::request_password_reset))
        .route(
            "/auth/password-reset/verify",
            post(auth_h::verify_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(auth_h::confirm_password_reset),
        );

    let profile = Router::new()
        .route(
            "/auth/profile",
            get(auth_h::get_profile).patch(auth_h::update_profile),
        )
        .with_auth();

    let admin = Router::new()
        .route("/admin/accounts", get(admin::list_accounts))
        .route(
            "/admin/warehouses/:id/approve",
            patch(admin::approve_warehouse),
        )
        .route("/admin/drivers/:id/approve", patch(admin::approve_driver))
        .with_role(AccountRole::Admin);

    let warehouse_routes = Router::new()
        .route(
            "/warehouse/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/warehouse/categories/:id",
            axum::routing::put(catalog::update_category).delete(catalog::delete_category),
        )
        .route(
            "/warehouse/subcategories",
            get(catalog::list_subcategories).post(catalog::create_subcategory),
        )
        .route(
            "/warehouse/subcategories/:id",
            axum::routing::put(catalog::update_subcategory).delete(catalog::delete_subcategory),
        )
        .route(
            "/warehouse/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/warehouse/products/sku/:sku",
            get(catalog::get_product_by_sku),
        )
        .route("/warehouse/products/:id", patch(catalog::update_product))
        .route(
            "/warehouse/products/:id/disable",
            patch(catalog::disable_product),
        )
        .route(
            "/warehouse/products/:id/restock",
            patch(catalog::restock_product),
        )
        .route("/warehouse/orders/pending", get(warehouse::pending_orders))
        .route(
            "/warehouse/drivers/available",
            get(warehouse::available_drivers),
        )
        .route("/warehouse/deliveries", post(warehouse::assign_delivery))
        .route("/warehouse/dashboard", get(warehouse::dashboard))
        .with_role(AccountRole::Warehouse);

    let customer_routes = Router::new()
        .route(
            "/customer/addresses",
            get(customer::list_addresses).post(customer::create_address),
        )
        .route(
            "/customer/addresses/:id",
            get(customer::get_address)
                .put(customer::update_address)
                .delete(customer::delete_address),
        )
        .route("/customer/cart", get(customer::view_cart))
        .route("/customer/cart/add", post(customer::add_to_cart))
        .route(
            "/customer/cart/items/:id",
            delete(customer::remove_from_cart),
        )
        .route(
            "/customer/favorites",
            get(customer::list_favorites).post(customer::add_favorite),
        )
        .route(
            "/customer/favorites/:product_id",
            delete(customer::remove_favorite),
        )
        .route(
            "/customer/orders",
            get(customer::list_orders).post(customer::create_order),
        )
        .route("/customer/orders/:id", get(customer::get_order))
        .route("/customer/payment", post(customer::record_payment))
        .route("/delivery/track/:order_number", get(delivery::track))
        .with_role(AccountRole::Customer);

    let driver_routes = Router::new()
        .route("/delivery/pending", get(delivery::pending))
        .route("/delivery/all-orders", get(delivery::all_orders))
        .route("/delivery/dashboard", get(delivery::dashboard))
        .route("/delivery/:id", get(delivery::detail))
        .route("/delivery/:id/pick-up", patch(delivery::pick_up))
        .route("/delivery/:id/in-transit", patch(delivery::in_transit))
        .route("/delivery/:id/resend-otp", patch(delivery::resend_otp))
        .route("/delivery/:id/delivered", patch(delivery::delivered))
        .route("/delivery/:id/cancel", patch(delivery::cancel))
        .with_role(AccountRole::Driver);

    let notification_routes = Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        .with_auth();

    let public_catalog = Router::new()
        .route(
            "/catalog/warehouses/:warehouse_id/categories",
            get(catalog::public_categories),
        )
        .route(
            "/catalog/warehouses/:warehouse_id/subcategories",
            get(catalog::public_subcategories),
        )
        .route(
            "/catalog/warehouses/:warehouse_id/products",
            get(catalog::public_products),
        )
        .route("/catalog/products/:sku", get(catalog::public_product));

    Router::new()
        .merge(auth_public)
        .merge(profile)
        .merge(admin)
        .merge(warehouse_routes)
        .merge(customer_routes)
        .merge(driver_routes)
        .merge(notification_routes)
        .merge(public_catalog)
}

/// Full application router: health, `/api/v1`, Swagger UI, request ids and
/// HTTP tracing. CORS and compression are left to the binary.
pub fn build_router(state: AppState, auth_service: Arc<AuthService>) -> Router {
    Router::new()
        .merge(handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            auth::inject_auth_service,
        ))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
