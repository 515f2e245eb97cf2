//! HTTP surface through the full router and its middleware stack

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

use common::{qris_webhook, success, TestApp, SKU};
use topup_backend::api;
use topup_backend::health::HealthChecker;
use topup_backend::models::OrderStatus;

fn router(app: &TestApp) -> Router {
    // Never connected unless /health is hit
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/topup_test")
        .unwrap();
    api::router(app.services.app_state(), HealthChecker::new(pool))
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn create_then_pay_order() {
    let app = TestApp::new();
    let router = router(&app);

    let response = router
        .clone()
        .oneshot(post_json(
            "/orders",
            json!({ "buyer_sku_code": SKU, "customer_no": "12345678" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));

    let created = body_json(response).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["status"], "pending");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = router
        .oneshot(post_json(
            &format!("/orders/{id}/pay"),
            json!({ "payment_method": "qris" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let paid = body_json(response).await;
    assert_eq!(paid["data"]["status"], "waiting_payment");
    assert!(paid["data"]["payment"].is_object());
}

#[tokio::test]
async fn unknown_order_is_404() {
    let app = TestApp::new();
    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri(format!("/orders/{}/status", uuid::Uuid::new_v4()))
                .header("x-request-id", "req-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-abc");
    let body = body_json(response).await;
    assert_eq!(body["request_id"], "req-abc");
}

#[tokio::test]
async fn gateway_webhook_acknowledges_and_settles() {
    let app = TestApp::new();
    app.provider.push(Ok(success("SN-HTTP")));
    let order = app.waiting_order().await;
    let (body, sig) = qris_webhook(&order.ref_id, "10000", "paid");

    let response = router(&app)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/qrispw")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-signature", sig)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    app.wait_for_status(order.id, OrderStatus::Success).await;
}

#[tokio::test]
async fn rejected_webhook_is_still_acknowledged() {
    let app = TestApp::new();
    let order = app.waiting_order().await;
    let (body, _) = qris_webhook(&order.ref_id, "10000", "paid");

    let response = router(&app)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/qrispw")
                .header("x-signature", "forged")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        app.orders.get(order.id).unwrap().status,
        OrderStatus::WaitingPayment
    );
    assert!(app.receipts.all()[0].error_message.is_some());
}

#[tokio::test]
async fn webhook_that_cannot_be_logged_asks_for_retry() {
    let app = TestApp::new();
    app.receipts.unavailable.store(true, Ordering::SeqCst);

    let response = router(&app)
        .oneshot(post_json("/webhook/digiflazz", json!({ "data": {} })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn member_routes_need_identity() {
    let app = TestApp::new();
    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri("/member/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn member_purchase_over_http() {
    let app = TestApp::new();
    let member = app.ledger.add_member(30_000);
    app.provider.push(Ok(success("SN-MEMBER")));

    let mut request = post_json(
        "/member/orders",
        json!({ "buyer_sku_code": SKU, "customer_no": "998877" }),
    );
    request
        .headers_mut()
        .insert("x-member-id", member.to_string().parse().unwrap());

    let response = router(&app).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "success");
    assert_eq!(body["data"]["is_member"], true);
    assert_eq!(app.ledger.balance_of(member), BigDecimal::from(20_000));
}

#[tokio::test]
async fn admin_routes_need_operator_header() {
    let app = TestApp::new();
    let router = router(&app);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/fulfillment/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/fulfillment/balance")
                .header("x-admin-id", "ops-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn liveness_probe_needs_no_database() {
    let app = TestApp::new();
    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
