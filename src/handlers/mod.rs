pub mod admin;
pub mod auth;
pub mod catalog;
pub mod customer;
pub mod delivery;
pub mod health;
pub mod notifications;
pub mod warehouse;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    addresses::AddressService, cart::CartService, catalog::CatalogService,
    deliveries::DeliveryService, favorites::FavoriteService, identity::IdentityService,
    notifications::NotificationService, orders::OrderService, payments::PaymentService,
    warehouses::WarehouseService,
};

pub use crate::AppState;

const DEFAULT_DELIVERY_RADIUS_KM: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Services layer shared by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub identity: Arc<IdentityService>,
    pub catalog: Arc<CatalogService>,
    pub addresses: Arc<AddressService>,
    pub cart: Arc<CartService>,
    pub favorites: Arc<FavoriteService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub deliveries: Arc<DeliveryService>,
    pub warehouses: Arc<WarehouseService>,
    pub notifications: Arc<NotificationService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        config: &AppConfig,
    ) -> Self {
        let events = Some(event_sender);
        let windows = config.otp_windows();
        let radius = Decimal::try_from(config.default_delivery_radius_km)
            .unwrap_or(DEFAULT_DELIVERY_RADIUS_KM);

        Self {
            identity: Arc::new(IdentityService::new(
                db_pool.clone(),
                events.clone(),
                auth_service.clone(),
                windows,
            )),
            catalog: Arc::new(CatalogService::new(db_pool.clone(), events.clone())),
            addresses: Arc::new(AddressService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone())),
            favorites: Arc::new(FavoriteService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), events.clone())),
            payments: Arc::new(PaymentService::new(db_pool.clone())),
            deliveries: Arc::new(DeliveryService::new(
                db_pool.clone(),
                events,
                windows.delivery,
                radius,
            )),
            warehouses: Arc::new(WarehouseService::new(db_pool.clone())),
            notifications: Arc::new(NotificationService::with_logging_channels(db_pool)),
            auth: auth_service,
        }
    }
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Pagination parameters for list operations
#[derive(Debug, Clone, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageQuery {
    /// Page is at least 1; limit is clamped to 1..=100.
    pub fn normalized(&self) -> (u64, u64) {
        (self.page.max(1), self.limit.clamp(1, 100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_is_clamped() {
        let q = PageQuery { page: 0, limit: 1000 };
        assert_eq!(q.normalized(), (1, 100));
        assert_eq!(PageQuery::default().normalized(), (1, 20));
    }
}
