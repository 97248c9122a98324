use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{
    account::AccountRole,
    category, delivery::DeliveryStatus, driver_profile, notification,
    order::{self, OrderStatus, PaymentMethod},
    order_item, payment::{self, PaymentStatus},
    product, shipping_address::{self, AddressType},
    subcategory, warehouse_profile::{self, IdentityType},
};

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quick-commerce API",
        version = "0.1.0",
        description = r#"
# Quick-commerce API

Backend for a hyperlocal grocery service. Customers order from nearby
warehouses, warehouses hand orders to their drivers, and drivers close each
delivery with a one-time code the customer reads out at the door.

## Authentication

Register, verify the SMS OTP, then log in to obtain a token pair. Send the
access token on every protected call:

```
Authorization: Bearer <access-token>
```

Warehouse and driver accounts also need admin approval before they can log in.

## Errors

```json
{
  "error": "Bad Request",
  "message": "Invalid OTP",
  "details": "invalid_otp",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Registration, OTP verification, login and password reset"),
        (name = "admin", description = "Account approval"),
        (name = "warehouse-catalog", description = "Warehouse-managed categories and products"),
        (name = "catalog", description = "Public catalog reads"),
        (name = "customer", description = "Addresses, cart, favourites, orders and payment"),
        (name = "warehouse", description = "Order hand-off and dashboard"),
        (name = "delivery", description = "Driver workflow and customer tracking"),
        (name = "notifications", description = "In-app notifications"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::health::health_check,

        crate::handlers::auth::register_customer,
        crate::handlers::auth::register_warehouse,
        crate::handlers::auth::register_driver,
        crate::handlers::auth::verify_otp,
        crate::handlers::auth::resend_otp,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh,
        crate::handlers::auth::get_profile,
        crate::handlers::auth::update_profile,
        crate::handlers::auth::request_password_reset,
        crate::handlers::auth::verify_password_reset,
        crate::handlers::auth::confirm_password_reset,

        crate::handlers::admin::approve_warehouse,
        crate::handlers::admin::approve_driver,
        crate::handlers::admin::list_accounts,

        crate::handlers::catalog::create_category,
        crate::handlers::catalog::list_categories,
        crate::handlers::catalog::update_category,
        crate::handlers::catalog::delete_category,
        crate::handlers::catalog::create_subcategory,
        crate::handlers::catalog::list_subcategories,
        crate::handlers::catalog::update_subcategory,
        crate::handlers::catalog::delete_subcategory,
        crate::handlers::catalog::create_product,
        crate::handlers::catalog::list_products,
        crate::handlers::catalog::get_product_by_sku,
        crate::handlers::catalog::update_product,
        crate::handlers::catalog::disable_product,
        crate::handlers::catalog::restock_product,
        crate::handlers::catalog::public_categories,
        crate::handlers::catalog::public_subcategories,
        crate::handlers::catalog::public_products,
        crate::handlers::catalog::public_product,

        crate::handlers::customer::list_addresses,
        crate::handlers::customer::create_address,
        crate::handlers::customer::get_address,
        crate::handlers::customer::update_address,
        crate::handlers::customer::delete_address,
        crate::handlers::customer::view_cart,
        crate::handlers::customer::add_to_cart,
        crate::handlers::customer::remove_from_cart,
        crate::handlers::customer::list_favorites,
        crate::handlers::customer::add_favorite,
        crate::handlers::customer::remove_favorite,
        crate::handlers::customer::create_order,
        crate::handlers::customer::list_orders,
        crate::handlers::customer::get_order,
        crate::handlers::customer::record_payment,

        crate::handlers::warehouse::pending_orders,
        crate::handlers::warehouse::available_drivers,
        crate::handlers::warehouse::assign_delivery,
        crate::handlers::warehouse::dashboard,

        crate::handlers::delivery::pending,
        crate::handlers::delivery::all_orders,
        crate::handlers::delivery::dashboard,
        crate::handlers::delivery::detail,
        crate::handlers::delivery::pick_up,
        crate::handlers::delivery::in_transit,
        crate::handlers::delivery::resend_otp,
        crate::handlers::delivery::delivered,
        crate::handlers::delivery::cancel,
        crate::handlers::delivery::track,

        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_read,
    ),
    components(
        schemas(
            AccountRole,
            IdentityType,
            AddressType,
            OrderStatus,
            PaymentMethod,
            PaymentStatus,
            DeliveryStatus,
            category::Model,
            subcategory::Model,
            product::Model,
            shipping_address::Model,
            order::Model,
            order_item::Model,
            payment::Model,
            notification::Model,
            warehouse_profile::Model,
            driver_profile::Model,
            crate::auth::TokenPair,
            crate::handlers::MessageResponse,
            crate::handlers::customer::FavoriteRequest,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_delivery_workflow_and_bearer_scheme() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Quick-commerce API"));
        assert!(json.contains("/api/v1/delivery/{id}/delivered"));
        assert!(json.contains("/api/v1/customer/orders"));
        assert!(json.contains("\"Bearer\""));
    }
}
