//! End-to-end tests for registration, OTP verification, approval gating and
//! password reset.

mod common;

use axum::http::{Method, StatusCode};
use common::{parse_id, TestApp, PASSWORD};
use quickcommerce_api::entities::otp::OtpPurpose;
use serde_json::json;

#[tokio::test]
async fn test_customer_must_verify_before_login() {
    let app = TestApp::new().await;
    let phone = "+919800000101";

    let (status, body) = app
        .post(
            "/api/v1/auth/register",
            json!({ "name": "Asha", "phone": phone, "email": null, "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "customer");
    let account_id = parse_id(&body["data"]["account_id"]);

    let (status, body) = app
        .post(
            "/api/v1/auth/login",
            json!({ "phone": phone, "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let code = app.latest_otp(account_id, OtpPurpose::Registration).await;
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, body) = app
        .post(
            "/api/v1/auth/verify-otp",
            json!({ "phone": phone, "otp": wrong }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "invalid_otp");

    let (status, _) = app
        .post(
            "/api/v1/auth/verify-otp",
            json!({ "phone": phone, "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // single use
    let (status, _) = app
        .post(
            "/api/v1/auth/verify-otp",
            json!({ "phone": phone, "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = app.login(phone).await;
    let (status, body) = app.get("/api/v1/auth/profile", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phone"], phone);
    assert_eq!(body["data"]["is_active"], true);
}

#[tokio::test]
async fn test_duplicate_phone_is_rejected() {
    let app = TestApp::new().await;
    app.customer("+919800000102").await;

    let (status, body) = app
        .post(
            "/api/v1/auth/register",
            json!({ "name": "Again", "phone": "+919800000102", "email": null, "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"], "conflict");
}

#[tokio::test]
async fn test_malformed_phone_fails_validation() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            "/api/v1/auth/register",
            json!({ "name": "Bad", "phone": "98000", "email": null, "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_warehouse_waits_for_admin_approval() {
    let app = TestApp::new().await;
    let phone = "+919800000103";

    let (status, body) = app
        .post(
            "/api/v1/auth/register/warehouse",
            json!({
                "name": "Depot",
                "phone": phone,
                "email": null,
                "password": PASSWORD,
                "warehouse_name": "North Depot",
                "identity_type": "Pan Card",
                "gst_no": null,
                "fssai_no": null,
                "operation_area": "Hebbal",
                "address": "1 Ring Road",
                "latitude": null,
                "longitude": null
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["data"]["warehouse_code"]
        .as_str()
        .unwrap()
        .starts_with("WH"));
    let warehouse_id = parse_id(&body["data"]["account_id"]);

    let code = app.latest_otp(warehouse_id, OtpPurpose::Registration).await;
    let (status, _) = app
        .post(
            "/api/v1/auth/verify-otp",
            json!({ "phone": phone, "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/api/v1/auth/login",
            json!({ "phone": phone, "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["details"], "forbidden");

    app.state
        .services
        .identity
        .ensure_admin("Admin", "+919800000199", PASSWORD)
        .await
        .expect("bootstrap admin");
    let admin_token = app.login("+919800000199").await;

    // only admins approve
    let customer = app.customer("+919800000104").await;
    let (status, _) = app
        .patch(
            &format!("/api/v1/admin/warehouses/{warehouse_id}/approve"),
            None,
            &customer.token,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .patch(
            &format!("/api/v1/admin/warehouses/{warehouse_id}/approve"),
            None,
            &admin_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["warehouse"]["approved"], true);

    let token = app.login(phone).await;
    let (status, _) = app.get("/api/v1/warehouse/dashboard", &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get("/api/v1/admin/accounts?role=warehouse", &admin_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn test_driver_registration_needs_existing_warehouse() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/api/v1/auth/register/driver",
            json!({
                "name": "Rider",
                "phone": "+919800000105",
                "email": null,
                "password": PASSWORD,
                "warehouse_id": uuid::Uuid::new_v4(),
                "address": "4 Lane",
                "license_no": "KA0120230001234",
                "aadhar_no": "123412341234",
                "pan_no": null,
                "vehicle_no": "KA01AB1234"
            }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
}

#[tokio::test]
async fn test_role_gates_and_missing_token() {
    let app = TestApp::new().await;
    let customer = app.customer("+919800000106").await;

    let (status, _) = app
        .request(Method::GET, "/api/v1/customer/cart", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/warehouse/dashboard", &customer.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/v1/delivery/pending", &customer.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/v1/customer/cart", &customer.token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_round_trip() {
    let app = TestApp::new().await;
    let customer = app.customer("+919800000107").await;

    let (status, _) = app
        .post(
            "/api/v1/auth/password-reset",
            json!({ "phone": customer.phone }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let code = app.latest_otp(customer.id, OtpPurpose::PasswordReset).await;
    let (status, body) = app
        .post(
            "/api/v1/auth/password-reset/verify",
            json!({ "phone": customer.phone, "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let reset_token = body["data"]["reset_token"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(
            "/api/v1/auth/password-reset/confirm",
            json!({ "phone": customer.phone, "token": reset_token, "new_password": "brand-new-pass" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // token is spent
    let (status, _) = app
        .post(
            "/api/v1/auth/password-reset/confirm",
            json!({ "phone": customer.phone, "token": reset_token, "new_password": "another-pass-1" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/auth/login",
            json!({ "phone": customer.phone, "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post(
            "/api/v1/auth/login",
            json!({ "phone": customer.phone, "password": "brand-new-pass" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let refresh = body["data"]["tokens"]["refresh_token"].as_str().unwrap();

    let (status, body) = app
        .post("/api/v1/auth/refresh", json!({ "refresh_token": refresh }), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["data"]["access_token"].is_string());
}

#[tokio::test]
async fn test_health_reports_database_up() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
}
