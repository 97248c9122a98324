//! Cart, order placement with stock reservation, and payment recording.

mod common;

use axum::http::{Method, StatusCode};
use common::{parse_id, TestApp};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected decimal, got {other}"),
    }
}

#[tokio::test]
async fn test_order_reserves_stock_and_clears_cart() {
    let app = TestApp::new().await;
    let warehouse = app.warehouse("+919800000201").await;
    let customer = app.customer("+919800000202").await;
    let address = app.address(&customer).await;

    let milk = app.product(&warehouse, "Milk", "30.00", 3).await;
    let bread = app.product(&warehouse, "Bread", "45.00", 5).await;
    assert_eq!(milk["sku_no"], "SKU000000001");
    assert_eq!(bread["sku_no"], "SKU000000002");

    let (status, cart) = app
        .post(
            "/api/v1/customer/cart/add",
            json!({ "product_id": milk["id"], "quantity": 2 }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["data"]["total_quantity"], 2);
    assert_eq!(decimal(&cart["data"]["total_price"]), Decimal::new(6000, 2));

    let (status, body) = app
        .order(
            &customer,
            address,
            &[(&milk, 3), (&bread, 1)],
            "COD",
            "135.00",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["order"]["status"], "Pending");
    assert_eq!(body["data"]["order"]["order_number"], "ORD000001");
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let milk_now = app.product_row(&milk["id"]).await;
    assert_eq!(milk_now["stock_quantity"], 0);
    assert_eq!(milk_now["is_available"], false);
    let bread_now = app.product_row(&bread["id"]).await;
    assert_eq!(bread_now["stock_quantity"], 4);
    assert_eq!(bread_now["is_available"], true);

    let (status, cart) = app.get("/api/v1/customer/cart", &customer.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["data"]["items"].as_array().unwrap().len(), 0);

    let (status, orders) = app.get("/api/v1/customer/orders", &customer.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders["data"]["total"], 1);
}

#[tokio::test]
async fn test_insufficient_stock_rolls_back_whole_order() {
    let app = TestApp::new().await;
    let warehouse = app.warehouse("+919800000211").await;
    let customer = app.customer("+919800000212").await;
    let address = app.address(&customer).await;

    let eggs = app.product(&warehouse, "Eggs", "6.00", 10).await;
    let butter = app.product(&warehouse, "Butter", "55.00", 2).await;

    let (status, body) = app
        .order(
            &customer,
            address,
            &[(&eggs, 4), (&butter, 5)],
            "Online",
            "299.00",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "insufficient_stock");

    assert_eq!(app.product_row(&eggs["id"]).await["stock_quantity"], 10);
    assert_eq!(app.product_row(&butter["id"]).await["stock_quantity"], 2);

    let (_, orders) = app.get("/api/v1/customer/orders", &customer.token).await;
    assert_eq!(orders["data"]["total"], 0);
}

#[tokio::test]
async fn test_cart_rejects_more_than_stock() {
    let app = TestApp::new().await;
    let warehouse = app.warehouse("+919800000221").await;
    let customer = app.customer("+919800000222").await;
    let rice = app.product(&warehouse, "Rice", "80.00", 1).await;

    let (status, body) = app
        .post(
            "/api/v1/customer/cart/add",
            json!({ "product_id": rice["id"], "quantity": 2 }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "insufficient_stock");
}

#[tokio::test]
async fn test_orders_are_private_to_their_customer() {
    let app = TestApp::new().await;
    let warehouse = app.warehouse("+919800000231").await;
    let owner = app.customer("+919800000232").await;
    let other = app.customer("+919800000233").await;
    let address = app.address(&owner).await;
    let tea = app.product(&warehouse, "Tea", "120.00", 5).await;

    let (_, placed) = app
        .order(&owner, address, &[(&tea, 1)], "COD", "120.00")
        .await;
    let order_id = parse_id(&placed["data"]["order"]["id"]);

    let (status, _) = app
        .get(&format!("/api/v1/customer/orders/{order_id}"), &other.token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // another customer's address cannot be used either
    let (status, _) = app
        .order(&other, address, &[(&tea, 1)], "COD", "120.00")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // address is now referenced by an order
    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/customer/addresses/{address}"),
            None,
            Some(&owner.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_recording_rules() {
    let app = TestApp::new().await;
    let warehouse = app.warehouse("+919800000241").await;
    let customer = app.customer("+919800000242").await;
    let address = app.address(&customer).await;
    let oil = app.product(&warehouse, "Oil", "150.00", 5).await;

    let (_, online) = app
        .order(&customer, address, &[(&oil, 1)], "Online", "150.00")
        .await;
    let online_id = online["data"]["order"]["id"].clone();

    let (status, body) = app
        .post(
            "/api/v1/customer/payment",
            json!({
                "order_id": online_id,
                "payment_method": "Online",
                "amount": "149.00",
                "gateway_order_id": "order_1",
                "gateway_payment_id": "pay_1"
            }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app
        .post(
            "/api/v1/customer/payment",
            json!({
                "order_id": online_id,
                "payment_method": "Online",
                "amount": "150.00",
                "gateway_order_id": "order_1",
                "gateway_payment_id": null
            }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app
        .post(
            "/api/v1/customer/payment",
            json!({
                "order_id": online_id,
                "payment_method": "Online",
                "amount": "150.00",
                "gateway_order_id": "order_1",
                "gateway_payment_id": "pay_1"
            }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "Completed");

    // a second record for the same order trips the unique order_id index
    let (status, body) = app
        .post(
            "/api/v1/customer/payment",
            json!({
                "order_id": online_id,
                "payment_method": "Online",
                "amount": "150.00",
                "gateway_order_id": "order_1",
                "gateway_payment_id": "pay_2"
            }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["details"], "conflict");

    let (_, cod) = app
        .order(&customer, address, &[(&oil, 1)], "COD", "150.00")
        .await;
    let (status, body) = app
        .post(
            "/api/v1/customer/payment",
            json!({
                "order_id": cod["data"]["order"]["id"],
                "payment_method": "COD",
                "amount": "150.00",
                "gateway_order_id": null,
                "gateway_payment_id": null
            }),
            Some(&customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "Pending");

    let (_, detail) = app
        .get(
            &format!(
                "/api/v1/customer/orders/{}",
                online_id.as_str().unwrap()
            ),
            &customer.token,
        )
        .await;
    assert_eq!(detail["data"]["payment"]["status"], "Completed");
}

#[tokio::test]
async fn test_favourites_and_public_catalog() {
    let app = TestApp::new().await;
    let warehouse = app.warehouse("+919800000251").await;
    let customer = app.customer("+919800000252").await;
    let jam = app.product(&warehouse, "Jam", "90.00", 4).await;

    for _ in 0..2 {
        let (status, _) = app
            .post(
                "/api/v1/customer/favorites",
                json!({ "product_id": jam["id"] }),
                Some(&customer.token),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, favs) = app.get("/api/v1/customer/favorites", &customer.token).await;
    assert_eq!(favs["data"].as_array().unwrap().len(), 1);

    let (status, listing) = app
        .request(
            Method::GET,
            &format!("/api/v1/catalog/warehouses/{}/products", warehouse.id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["data"]["total"], 1);

    let (status, _) = app
        .patch(
            &format!(
                "/api/v1/warehouse/products/{}/disable",
                jam["id"].as_str().unwrap()
            ),
            None,
            &warehouse.token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = app
        .request(
            Method::GET,
            &format!("/api/v1/catalog/warehouses/{}/products", warehouse.id),
            None,
            None,
        )
        .await;
    assert_eq!(listing["data"]["total"], 0);

    let (status, _) = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/catalog/products/{}",
                jam["sku_no"].as_str().unwrap()
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
