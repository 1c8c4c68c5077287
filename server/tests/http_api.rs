mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use bingo_server::config::Config;
use bingo_server::gateway::fake::FAKE_TICKET_URL;
use bingo_server::gateway::{FakeGateway, PaymentStatus};
use bingo_server::handlers::AppState;
use bingo_server::routes::create_routes;
use bingo_server::store::InMemoryStore;
use common::online_sale;

fn app(gateway: Arc<FakeGateway>) -> Router {
    let config = Config::from_lookup(|_| None).unwrap();
    let state = AppState::new(Arc::new(InMemoryStore::new()), gateway, online_sale());
    create_routes(state, &config)
}

async fn send(app: &Router, method: &str, uri: &str, roles: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, _, bytes) = send_raw(app, method, uri, roles, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    roles: &str,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    if !roles.is_empty() {
        request = request.header("x-user-roles", roles);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

async fn create_event(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/events",
        "adm",
        Some(json!({
            "name": "Festa Junina",
            "event_date": "2024-06-24",
            "book_count": 2,
            "cards_per_book": 3,
            "sale_price": "10.00",
            "max_commission": "2.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn create_person(app: &Router, name: &str) -> String {
    let (status, body) = send(app, "POST", "/people", "", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check_has_security_headers() {
    let app = app(Arc::new(FakeGateway::new()));
    let (status, headers, _) = send_raw(&app, "GET", "/health", "", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_event_creation_requires_admin() {
    let app = app(Arc::new(FakeGateway::new()));
    let (status, body) = send(
        &app,
        "POST",
        "/events",
        "op",
        Some(json!({
            "name": "Festa",
            "event_date": "2024-06-24",
            "book_count": 1,
            "cards_per_book": 3,
            "sale_price": 10,
            "max_commission": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_card_listing_and_assignment() {
    let app = app(Arc::new(FakeGateway::new()));
    let event_id = create_event(&app).await;
    let ana = create_person(&app, "Ana").await;

    let (status, body) = send(&app, "GET", &format!("/events/{event_id}/cards"), "", None).await;
    assert_eq!(status, StatusCode::OK);
    let cards = body["data"].as_array().unwrap();
    assert_eq!(cards.len(), 6);
    assert_eq!(cards[0]["number"], "00001");
    assert_eq!(cards[0]["book"], "001");
    let card_id = cards[0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", &format!("/cards/{card_id}"), "op", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["actions"], json!(["assign"]));

    let (status, body) = send(
        &app,
        "POST",
        &format!("/cards/{card_id}/assign"),
        "op",
        Some(json!({ "person_id": ana, "apply_to_book": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/events/{event_id}/cards?status=awaiting_settlement"),
        "",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (status, body) = send(&app, "GET", &format!("/people/{ana}/cards"), "", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    // Book 001 is now assigned, so assigning it again conflicts.
    let (status, body) = send(
        &app,
        "POST",
        &format!("/events/{event_id}/cards/batch"),
        "op",
        Some(json!({ "first": 1, "last": 4, "action": "assign", "person_id": ana })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_settle_over_cap_is_bad_request() {
    let app = app(Arc::new(FakeGateway::new()));
    let event_id = create_event(&app).await;
    let ana = create_person(&app, "Ana").await;

    let (_, body) = send(&app, "GET", &format!("/events/{event_id}/cards"), "", None).await;
    let card_id = body["data"][0]["id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &format!("/cards/{card_id}/assign"),
        "op",
        Some(json!({ "person_id": ana })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/cards/{card_id}/settle"),
        "op",
        Some(json!({ "paid": true, "commission": "3" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, "POST", &format!("/cards/{card_id}/return"), "op", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_export_is_csv() {
    let app = app(Arc::new(FakeGateway::new()));
    let event_id = create_event(&app).await;

    let (status, headers, bytes) =
        send_raw(&app, "GET", &format!("/events/{event_id}/cards/export"), "", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text.lines().count(), 7);
    assert!(text.lines().nth(1).unwrap().starts_with("00001,001,"));
}

#[tokio::test]
async fn test_purchase_redirects_to_checkout_and_confirms() {
    let gateway = Arc::new(FakeGateway::with_status(PaymentStatus::Pending));
    let app = app(gateway.clone());
    create_event(&app).await;

    let (status, headers, bytes) = send_raw(
        &app,
        "POST",
        "/purchases",
        "",
        Some(json!({ "name": "Maria Silva", "cpf": "12345678909", "card_count": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], FAKE_TICKET_URL);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let purchase_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, headers, _) =
        send_raw(&app, "GET", &format!("/purchases/{purchase_id}/pay"), "", None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], FAKE_TICKET_URL);

    let (_, body) = send(&app, "GET", &format!("/purchases/{purchase_id}"), "", None).await;
    assert_eq!(body["data"]["status_label"], "Pending");
    assert_eq!(body["data"]["autoreload"], 30);

    gateway.set_status(PaymentStatus::Approved).await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/purchases/{purchase_id}/refresh"),
        "",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "approved");

    let (_, body) = send(&app, "GET", &format!("/purchases/{purchase_id}"), "", None).await;
    assert_eq!(body["data"]["status_label"], "Confirmed");
    assert_eq!(body["data"]["cards"].as_array().unwrap().len(), 5);

    let (status, _) = send(&app, "GET", &format!("/purchases/{purchase_id}/pay"), "", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(&app, "GET", "/purchases?cpf=12345678909", "", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_purchase_without_event_is_not_found() {
    let app = app(Arc::new(FakeGateway::new()));
    let (status, body) = send(
        &app,
        "POST",
        "/purchases",
        "",
        Some(json!({ "name": "Maria", "card_count": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_oversized_purchase_is_rejected_before_charging() {
    let gateway = Arc::new(FakeGateway::new());
    let app = app(gateway.clone());
    create_event(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/purchases",
        "",
        Some(json!({ "name": "Maria", "card_count": i32::MAX })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(gateway.charge_count(), 0);
}
