//! HTTP-level tests for the checkout gateway: session creation, status
//! lookup, webhook receiver response codes, and the refund surface.

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use checkout_api::{create_router, AppConfig, AppState};
use checkout_core::{PaymentStatus, RedirectTarget, SessionStatus};
use checkout_store::signature;
use chrono::Utc;

const SECRET: &str = "whsec_api_test";

fn test_state() -> AppState {
    AppState::in_memory(AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        database_path: ":memory:".to_string(),
        webhook_secret: SECRET.to_string(),
        provider_checkout_base_url: "https://checkout.provider.test".to_string(),
    })
    .expect("state")
}

fn server() -> TestServer {
    TestServer::new(create_router(test_state())).expect("server")
}

fn checkout_body() -> serde_json::Value {
    serde_json::json!({
        "lineItems": [{
            "product_id": "course-rust",
            "product_type": "course",
            "name": "Rust Course",
            "unit_amount_minor": 1999,
            "quantity": 1
        }],
        "successUrl": "https://shop.test/checkout/success",
        "cancelUrl": "https://shop.test/checkout/cancel"
    })
}

fn paid_event(event_id: &str, session_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": event_id,
        "type": "checkout.session.paid",
        "created": Utc::now().timestamp(),
        "data": { "object": { "id": session_id } }
    }))
    .unwrap()
}

async fn create_session(server: &TestServer) -> RedirectTarget {
    let response = server.post("/api/v1/checkout").json(&checkout_body()).await;
    response.assert_status_ok();
    response.json::<RedirectTarget>()
}

fn signature_header(value: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("provider-signature"),
        HeaderValue::from_str(value).expect("header value"),
    )
}

async fn deliver_webhook(
    server: &TestServer,
    body: Vec<u8>,
) -> axum_test::TestResponse {
    let (name, value) = signature_header(&signature::sign(
        SECRET,
        &body,
        Utc::now().timestamp(),
    ));
    server
        .post("/webhook/provider")
        .add_header(name, value)
        .content_type("application/json")
        .bytes(body.into())
        .await
}

#[tokio::test]
async fn health_reports_service() {
    let server = server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["service"], "checkout-gateway");
}

#[tokio::test]
async fn checkout_creates_session_with_redirect() {
    let server = server();
    let target = create_session(&server).await;

    let session_id = target.session_id.expect("session id");
    assert!(session_id.starts_with("cks_"));
    assert_eq!(
        target.redirect_url,
        format!("https://checkout.provider.test/pay/{}", session_id)
    );
}

#[tokio::test]
async fn checkout_rejects_empty_cart() {
    let server = server();
    let response = server
        .post("/api/v1/checkout")
        .json(&serde_json::json!({
            "lineItems": [],
            "successUrl": "https://shop.test/success",
            "cancelUrl": "https://shop.test/cancel"
        }))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn session_lookup_round_trip() {
    let server = server();
    let target = create_session(&server).await;
    let session_id = target.session_id.unwrap();

    let response = server
        .get(&format!("/api/v1/sessions/{}", session_id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["session_id"], session_id);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount_total_minor"], 1999);

    let missing = server.get("/api/v1/sessions/cks_ghost").await;
    missing.assert_status_not_found();
}

#[tokio::test]
async fn webhook_applies_then_ignores_duplicate() {
    let server = server();
    let session_id = create_session(&server).await.session_id.unwrap();

    let first = deliver_webhook(&server, paid_event("evt_1", &session_id)).await;
    first.assert_status_ok();
    let body: serde_json::Value = first.json();
    assert_eq!(body["applied"], true);

    // at-least-once delivery: the replay is acknowledged, not re-applied
    let second = deliver_webhook(&server, paid_event("evt_1", &session_id)).await;
    second.assert_status_ok();
    let body: serde_json::Value = second.json();
    assert_eq!(body["applied"], false);

    let session = server
        .get(&format!("/api/v1/sessions/{}", session_id))
        .await
        .json::<serde_json::Value>();
    assert_eq!(session["payment_status"], "paid");
    assert_eq!(session["status"], "completed");
}

#[tokio::test]
async fn webhook_bad_signature_is_400() {
    let server = server();
    let session_id = create_session(&server).await.session_id.unwrap();

    let body = paid_event("evt_1", &session_id);
    let (name, value) = signature_header(&signature::sign(
        "whsec_wrong",
        &body,
        Utc::now().timestamp(),
    ));
    let response = server
        .post("/webhook/provider")
        .add_header(name, value)
        .content_type("application/json")
        .bytes(body.into())
        .await;
    response.assert_status_bad_request();

    // nothing moved
    let session = server
        .get(&format!("/api/v1/sessions/{}", session_id))
        .await
        .json::<serde_json::Value>();
    assert_eq!(session["payment_status"], "unpaid");
}

#[tokio::test]
async fn webhook_missing_header_is_400() {
    let server = server();
    let response = server
        .post("/webhook/provider")
        .content_type("application/json")
        .bytes(paid_event("evt_1", "cks_x").into())
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn webhook_unknown_session_is_404() {
    let server = server();
    let response = deliver_webhook(&server, paid_event("evt_1", "cks_ghost")).await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn refund_flow_over_http() {
    let server = server();
    let session_id = create_session(&server).await.session_id.unwrap();
    deliver_webhook(&server, paid_event("evt_1", &session_id))
        .await
        .assert_status_ok();

    // full refund
    let created = server
        .post(&format!("/api/v1/sessions/{}/refunds", session_id))
        .json(&serde_json::json!({
            "amountMinorUnits": 1999,
            "reason": "customer request"
        }))
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let refund: serde_json::Value = created.json();
    let refund_id = refund["refund_id"].as_str().unwrap().to_string();
    assert_eq!(refund["status"], "pending");

    // settle it
    let settled = server
        .post(&format!("/api/v1/refunds/{}/result", refund_id))
        .json(&serde_json::json!({ "success": true }))
        .await;
    settled.assert_status_ok();

    let session = server
        .get(&format!("/api/v1/sessions/{}", session_id))
        .await
        .json::<serde_json::Value>();
    assert_eq!(session["payment_status"], "refunded");

    // the ledger is exhausted
    let over = server
        .post(&format!("/api/v1/sessions/{}/refunds", session_id))
        .json(&serde_json::json!({
            "amountMinorUnits": 1,
            "reason": "over"
        }))
        .await;
    over.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn refund_on_unpaid_session_is_conflict() {
    let server = server();
    let session_id = create_session(&server).await.session_id.unwrap();

    let response = server
        .post(&format!("/api/v1/sessions/{}/refunds", session_id))
        .json(&serde_json::json!({
            "amountMinorUnits": 100,
            "reason": "too early"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn session_statuses_serialize_for_polling() {
    // the polling client matches on these literal strings
    assert_eq!(
        serde_json::to_value(SessionStatus::Pending).unwrap(),
        "pending"
    );
    assert_eq!(
        serde_json::to_value(PaymentStatus::RefundPending).unwrap(),
        "refund_pending"
    );
}
