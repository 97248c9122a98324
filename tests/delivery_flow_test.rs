//! Warehouse hand-off and the driver's delivery lifecycle, including the
//! proof-of-delivery OTP.

mod common;

use axum::http::StatusCode;
use common::{parse_id, Actor, TestApp};
use quickcommerce_api::entities::{driver_profile, payment};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use uuid::Uuid;

struct Scenario {
    app: TestApp,
    warehouse: Actor,
    customer: Actor,
    driver: Actor,
    product: Value,
    order_id: Uuid,
    order_number: String,
}

/// Places a COD order for `quantity` of `product` and records its pending payment.
async fn place_cod(app: &TestApp, customer: &Actor, product: &Value, quantity: i32, total: &str) -> (Uuid, String) {
    let address = app.address(customer).await;
    let (status, placed) = app
        .order(customer, address, &[(product, quantity)], "COD", total)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{placed}");
    let (status, body) = app
        .post(
            "/api/v1/customer/payment",
            json!({
                "order_id": placed["data"]["order"]["id"],
                "payment_method": "COD",
                "amount": total,
                "gateway_order_id": null,
                "gateway_payment_id": null
            }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        parse_id(&placed["data"]["order"]["id"]),
        placed["data"]["order"]["order_number"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}

async fn scenario(prefix: u32) -> Scenario {
    let app = TestApp::new().await;
    let warehouse = app.warehouse(&format!("+9198000{prefix}01")).await;
    let customer = app.customer(&format!("+9198000{prefix}02")).await;
    let driver = app
        .driver(warehouse.id, &format!("+9198000{prefix}03"))
        .await;
    let product = app.product(&warehouse, "Apples", "40.00", 10).await;
    let (order_id, order_number) = place_cod(&app, &customer, &product, 2, "80.00").await;

    Scenario {
        app,
        warehouse,
        customer,
        driver,
        product,
        order_id,
        order_number,
    }
}

impl Scenario {
    async fn assign(&self) -> Uuid {
        self.assign_orders(&[self.order_id]).await
    }

    async fn assign_orders(&self, order_ids: &[Uuid]) -> Uuid {
        let (status, body) = self
            .app
            .post(
                "/api/v1/warehouse/deliveries",
                json!({
                    "order_ids": order_ids,
                    "driver_id": self.driver.id,
                    "delivery_radius_km": null
                }),
                Some(&self.warehouse.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "assign: {body}");
        assert_eq!(body["data"]["status"], "PROCESSING");
        assert_eq!(body["data"]["orders"].as_array().unwrap().len(), order_ids.len());
        parse_id(&body["data"]["id"])
    }

    async fn driver_patch(&self, delivery_id: Uuid, action: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.app
            .patch(
                &format!("/api/v1/delivery/{delivery_id}/{action}"),
                body,
                &self.driver.token,
            )
            .await
    }

    async fn delivery_status(&self, delivery_id: Uuid) -> Value {
        let (status, body) = self
            .app
            .get(&format!("/api/v1/delivery/{delivery_id}"), &self.driver.token)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["status"].clone()
    }

    async fn order_status(&self) -> Value {
        self.order_status_of(&self.customer, self.order_id).await
    }

    async fn order_status_of(&self, customer: &Actor, order_id: Uuid) -> Value {
        let (status, body) = self
            .app
            .get(&format!("/api/v1/customer/orders/{order_id}"), &customer.token)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["order"]["status"].clone()
    }

    async fn driver_is_free(&self) -> bool {
        driver_profile::Entity::find_by_id(self.driver.id)
            .one(self.app.db())
            .await
            .expect("query driver")
            .expect("driver profile")
            .is_free
    }

    async fn payment_status(&self) -> String {
        self.payment_status_of(self.order_id).await
    }

    async fn payment_status_of(&self, order_id: Uuid) -> String {
        let row = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .one(self.app.db())
            .await
            .expect("query payment")
            .expect("payment recorded");
        serde_json::to_value(row.status)
            .unwrap()
            .as_str()
            .unwrap()
            .to_string()
    }
}

#[tokio::test]
async fn test_full_delivery_with_otp_completes_orders_and_settles_cod() {
    let s = scenario(301).await;

    let (status, drivers) = s
        .app
        .get("/api/v1/warehouse/drivers/available", &s.warehouse.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drivers["data"].as_array().unwrap().len(), 1);

    let delivery_id = s.assign().await;
    assert!(!s.driver_is_free().await);
    assert_eq!(s.order_status().await, "Processing");

    let (_, drivers) = s
        .app
        .get("/api/v1/warehouse/drivers/available", &s.warehouse.token)
        .await;
    assert_eq!(drivers["data"].as_array().unwrap().len(), 0);

    let (status, pending) = s.app.get("/api/v1/delivery/pending", &s.driver.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["data"].as_array().unwrap().len(), 1);

    let (status, body) = s.driver_patch(delivery_id, "in-transit", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["details"], "invalid_status");

    let (status, body) = s.driver_patch(delivery_id, "pick-up", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "PICKED_UP");

    let (status, body) = s.driver_patch(delivery_id, "in-transit", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "IN_TRANSIT");
    let code = body["data"]["otp"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);

    let (status, tracking) = s
        .app
        .get(
            &format!("/api/v1/delivery/track/{}", s.order_number),
            &s.customer.token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracking["data"]["delivery_status"], "IN_TRANSIT");

    let (status, body) = s.driver_patch(delivery_id, "delivered", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, body) = s
        .driver_patch(delivery_id, "delivered", Some(json!({ "otp": wrong })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "invalid_otp");

    let (status, body) = s
        .driver_patch(delivery_id, "delivered", Some(json!({ "otp": code })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "DELIVERED");
    assert!(body["data"]["delivered_at"].is_string());

    assert_eq!(s.order_status().await, "Completed");
    assert_eq!(s.payment_status().await, "Completed");
    assert!(s.driver_is_free().await);

    let (status, body) = s.driver_patch(delivery_id, "cancel", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "invalid_status");

    let (status, dashboard) = s.app.get("/api/v1/delivery/dashboard", &s.driver.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["data"]["completed"], 1);
}

#[tokio::test]
async fn test_expired_otp_needs_a_resend() {
    let s = scenario(302).await;
    let delivery_id = s.assign().await;
    s.driver_patch(delivery_id, "pick-up", None).await;
    let (_, body) = s.driver_patch(delivery_id, "in-transit", None).await;
    let stale = body["data"]["otp"].as_str().unwrap().to_string();

    s.app.age_delivery_otp(delivery_id, 20).await;

    let (status, body) = s
        .driver_patch(delivery_id, "delivered", Some(json!({ "otp": stale })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "expired_credential");

    let (status, body) = s.driver_patch(delivery_id, "resend-otp", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "IN_TRANSIT");
    let fresh = body["data"]["otp"].as_str().unwrap().to_string();

    let (status, body) = s
        .driver_patch(delivery_id, "delivered", Some(json!({ "otp": fresh })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(s.order_status().await, "Completed");
}

#[tokio::test]
async fn test_only_the_assigned_driver_moves_a_delivery() {
    let s = scenario(303).await;
    let intruder = s.app.driver(s.warehouse.id, "+919800030304").await;
    let delivery_id = s.assign().await;

    let (status, body) = s
        .app
        .patch(
            &format!("/api/v1/delivery/{delivery_id}/pick-up"),
            None,
            &intruder.token,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _) = s
        .app
        .get(&format!("/api/v1/delivery/{delivery_id}"), &intruder.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a busy driver cannot take a second batch
    let (status, _) = s
        .app
        .post(
            "/api/v1/warehouse/deliveries",
            json!({ "order_ids": [s.order_id], "driver_id": s.driver.id, "delivery_radius_km": null }),
            Some(&s.warehouse.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_marks_orders_canceled_without_restock() {
    let s = scenario(304).await;
    let delivery_id = s.assign().await;
    assert_eq!(s.app.product_row(&s.product["id"]).await["stock_quantity"], 8);

    let (status, body) = s.driver_patch(delivery_id, "cancel", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "CANCELLED");

    assert_eq!(s.order_status().await, "Canceled");
    assert_eq!(s.payment_status().await, "Canceled");
    assert!(s.driver_is_free().await);
    assert_eq!(s.app.product_row(&s.product["id"]).await["stock_quantity"], 8);

    let (status, _) = s.driver_patch(delivery_id, "pick-up", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = s
        .app
        .get("/api/v1/warehouse/orders/pending", &s.warehouse.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_one_delivery_completes_every_linked_order() {
    let s = scenario(305).await;
    let neighbour = s.app.customer("+919800030505").await;
    let (second_id, second_number) = place_cod(&s.app, &neighbour, &s.product, 1, "40.00").await;
    assert_eq!(s.app.product_row(&s.product["id"]).await["stock_quantity"], 7);

    let delivery_id = s.assign_orders(&[s.order_id, second_id]).await;

    let (status, body) = s.driver_patch(delivery_id, "pick-up", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = s.driver_patch(delivery_id, "in-transit", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let code = body["data"]["otp"].as_str().unwrap().to_string();

    // picking up again while in transit is refused and changes nothing
    let (status, body) = s.driver_patch(delivery_id, "pick-up", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["details"], "invalid_status");
    assert_eq!(s.delivery_status(delivery_id).await, "IN_TRANSIT");

    let (status, body) = s
        .driver_patch(delivery_id, "delivered", Some(json!({ "otp": code })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 2);

    // a second confirmation is rejected without side effects
    let (status, body) = s
        .driver_patch(delivery_id, "delivered", Some(json!({ "otp": code })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["details"], "invalid_status");

    assert_eq!(s.delivery_status(delivery_id).await, "DELIVERED");
    assert_eq!(s.order_status().await, "Completed");
    assert_eq!(s.order_status_of(&neighbour, second_id).await, "Completed");
    assert_eq!(s.payment_status().await, "Completed");
    assert_eq!(s.payment_status_of(second_id).await, "Completed");
    assert!(s.driver_is_free().await);
    assert_eq!(s.app.product_row(&s.product["id"]).await["stock_quantity"], 7);

    let (status, tracking) = s
        .app
        .get(
            &format!("/api/v1/delivery/track/{second_number}"),
            &neighbour.token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracking["data"]["delivery_status"], "DELIVERED");

    let (_, dashboard) = s.app.get("/api/v1/delivery/dashboard", &s.driver.token).await;
    assert_eq!(dashboard["data"]["completed"], 1);
}

#[tokio::test]
async fn test_cancel_reaches_every_linked_order() {
    let s = scenario(306).await;
    let neighbour = s.app.customer("+919800030605").await;
    let (second_id, _) = place_cod(&s.app, &neighbour, &s.product, 3, "120.00").await;

    let delivery_id = s.assign_orders(&[s.order_id, second_id]).await;
    let (status, body) = s.driver_patch(delivery_id, "pick-up", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = s.driver_patch(delivery_id, "cancel", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "CANCELLED");

    assert_eq!(s.order_status().await, "Canceled");
    assert_eq!(s.order_status_of(&neighbour, second_id).await, "Canceled");
    assert_eq!(s.payment_status_of(second_id).await, "Canceled");
    assert!(s.driver_is_free().await);
    assert_eq!(s.app.product_row(&s.product["id"]).await["stock_quantity"], 5);
}
