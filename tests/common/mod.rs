#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Duration as ChronoDuration;
use quickcommerce_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    entities::{delivery, otp},
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "s3cret-pass";

/// Router and state over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

/// A verified, logged-in account.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub phone: String,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // Every sqlite in-memory connection is its own database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("in-memory sqlite");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from_app_config(&cfg)));
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            auth_service.clone(),
            &cfg,
        );
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            services.notifications.clone(),
        ));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = quickcommerce_api::build_router(state.clone(), auth_service);

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.state.db
    }

    /// Sends a request and returns the status with the parsed JSON body
    /// (`Value::Null` for an empty body).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, Some(token)).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), token).await
    }

    pub async fn patch(&self, uri: &str, body: Option<Value>, token: &str) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, body, Some(token)).await
    }

    /// Latest live code for an account, read straight from storage.
    pub async fn latest_otp(&self, account_id: Uuid, purpose: otp::OtpPurpose) -> String {
        otp::Entity::find()
            .filter(otp::Column::AccountId.eq(account_id))
            .filter(otp::Column::Purpose.eq(purpose))
            .order_by_desc(otp::Column::CreatedAt)
            .one(self.db())
            .await
            .expect("query otp")
            .expect("otp issued")
            .code
    }

    pub async fn verify_and_login(&self, account_id: Uuid, phone: &str) -> String {
        let code = self
            .latest_otp(account_id, otp::OtpPurpose::Registration)
            .await;
        let (status, _) = self
            .post(
                "/api/v1/auth/verify-otp",
                json!({ "phone": phone, "otp": code }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify otp for {phone}");
        self.login(phone).await
    }

    pub async fn login(&self, phone: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/auth/login",
                json!({ "phone": phone, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login {phone}: {body}");
        body["data"]["tokens"]["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    pub async fn customer(&self, phone: &str) -> Actor {
        let (status, body) = self
            .post(
                "/api/v1/auth/register",
                json!({
                    "name": "Test Customer",
                    "phone": phone,
                    "email": null,
                    "password": PASSWORD
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register customer: {body}");
        let id = parse_id(&body["data"]["account_id"]);
        let token = self.verify_and_login(id, phone).await;
        Actor {
            id,
            phone: phone.to_string(),
            token,
        }
    }

    /// Registered, verified and approved warehouse.
    pub async fn warehouse(&self, phone: &str) -> Actor {
        let (status, body) = self
            .post(
                "/api/v1/auth/register/warehouse",
                json!({
                    "name": "Depot Owner",
                    "phone": phone,
                    "email": null,
                    "password": PASSWORD,
                    "warehouse_name": "Central Depot",
                    "identity_type": "Aadhar Card",
                    "gst_no": null,
                    "fssai_no": null,
                    "operation_area": "Indiranagar",
                    "address": "12 Market Road",
                    "latitude": null,
                    "longitude": null
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register warehouse: {body}");
        let id = parse_id(&body["data"]["account_id"]);
        self.state
            .services
            .identity
            .approve_warehouse(id)
            .await
            .expect("approve warehouse");
        let token = self.verify_and_login(id, phone).await;
        Actor {
            id,
            phone: phone.to_string(),
            token,
        }
    }

    /// Registered, verified and approved driver of `warehouse_id`.
    pub async fn driver(&self, warehouse_id: Uuid, phone: &str) -> Actor {
        let (status, body) = self
            .post(
                "/api/v1/auth/register/driver",
                json!({
                    "name": "Rider",
                    "phone": phone,
                    "email": null,
                    "password": PASSWORD,
                    "warehouse_id": warehouse_id,
                    "address": "4 Lane",
                    "license_no": "KA0120230001234",
                    "aadhar_no": "123412341234",
                    "pan_no": null,
                    "vehicle_no": "KA01AB1234"
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register driver: {body}");
        let id = parse_id(&body["data"]["account_id"]);
        self.state
            .services
            .identity
            .approve_driver(id)
            .await
            .expect("approve driver");
        let token = self.verify_and_login(id, phone).await;
        Actor {
            id,
            phone: phone.to_string(),
            token,
        }
    }

    /// Category, subcategory and one product; returns the product JSON.
    pub async fn product(&self, warehouse: &Actor, title: &str, price: &str, stock: i32) -> Value {
        let (status, category) = self
            .post(
                "/api/v1/warehouse/categories",
                json!({ "title": format!("{title} category") }),
                Some(&warehouse.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "category: {category}");
        let category_id = category["data"]["id"].clone();

        let (status, subcategory) = self
            .post(
                "/api/v1/warehouse/subcategories",
                json!({ "category_id": category_id, "title": format!("{title} sub") }),
                Some(&warehouse.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "subcategory: {subcategory}");

        let (status, product) = self
            .post(
                "/api/v1/warehouse/products",
                json!({
                    "category_id": category_id,
                    "subcategory_id": subcategory["data"]["id"],
                    "title": title,
                    "description": null,
                    "price": price,
                    "discount": "0",
                    "stock_quantity": stock,
                    "reorder_level": 0
                }),
                Some(&warehouse.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "product: {product}");
        product["data"].clone()
    }

    pub async fn address(&self, customer: &Actor) -> Uuid {
        let (status, body) = self
            .post(
                "/api/v1/customer/addresses",
                json!({
                    "name": "Home",
                    "phone": "+919811111111",
                    "address_type": "Home",
                    "building": "Flat 3B",
                    "floor": "3",
                    "landmark": null,
                    "latitude": null,
                    "longitude": null,
                    "full_address": "Flat 3B, 7th Cross, Indiranagar"
                }),
                Some(&customer.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "address: {body}");
        parse_id(&body["data"]["id"])
    }

    /// Places an order for `(product_json, quantity)` lines.
    pub async fn order(
        &self,
        customer: &Actor,
        address_id: Uuid,
        lines: &[(&Value, i32)],
        method: &str,
        total: &str,
    ) -> (StatusCode, Value) {
        let items: Vec<Value> = lines
            .iter()
            .map(|(product, qty)| {
                json!({
                    "product_id": product["id"],
                    "quantity": qty,
                    "item_price": product["price"]
                })
            })
            .collect();
        self.post(
            "/api/v1/customer/orders",
            json!({
                "shipping_address_id": address_id,
                "items": items,
                "payment_method": method,
                "total_amount": total
            }),
            Some(&customer.token),
        )
        .await
    }

    /// Moves the delivery OTP issue time into the past.
    pub async fn age_delivery_otp(&self, delivery_id: Uuid, minutes: i64) {
        let found = delivery::Entity::find_by_id(delivery_id)
            .one(self.db())
            .await
            .expect("query delivery")
            .expect("delivery exists");
        let issued = found.otp_issued_at.expect("otp issued");
        let mut active: delivery::ActiveModel = found.into();
        active.otp_issued_at = Set(Some(issued - ChronoDuration::minutes(minutes)));
        active.update(self.db()).await.expect("age otp");
    }

    pub async fn product_row(&self, product_id: &Value) -> Value {
        let (status, body) = self
            .request(
                Method::GET,
                &format!(
                    "/api/v1/catalog/products/{}",
                    self.sku_of(product_id).await
                ),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "product lookup: {body}");
        body["data"].clone()
    }

    async fn sku_of(&self, product_id: &Value) -> String {
        use quickcommerce_api::entities::product;
        product::Entity::find_by_id(parse_id(product_id))
            .one(self.db())
            .await
            .expect("query product")
            .expect("product exists")
            .sku_no
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn parse_id(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("expected uuid, got {value}"))
}
