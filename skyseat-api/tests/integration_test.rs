use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use skyseat_api::middleware::auth::{issue_token, ROLE_ADMIN, ROLE_CUSTOMER};
use skyseat_api::{app, state::AuthConfig, AppState};
use skyseat_core::mailer::LogMailer;
use skyseat_core::{FlightId, SeatId, SeatMapLayout, UserId};
use skyseat_store::app_config::{BusinessRules, SeatMapConfig};
use skyseat_store::{InMemoryBookingRepository, InMemorySeatRepository};

const SECRET: &str = "integration-secret";
const WEBHOOK_SECRET: &str = "provider-shared-secret";
const FLIGHT: i64 = 500;

/// Webhook-driven payments so every transition is triggered by the test.
fn test_state() -> AppState {
    AppState::new(
        Arc::new(InMemorySeatRepository::new()),
        Arc::new(InMemoryBookingRepository::new()),
        Arc::new(LogMailer),
        None,
        BusinessRules::default(),
        SeatMapConfig {
            rows: 2,
            letters: "ABC".to_string(),
            default_fare: 12_000,
            demo_flights: vec![],
        },
        64,
        AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
            webhook_secret: WEBHOOK_SECRET.to_string(),
        },
    )
}

async fn seeded() -> (AppState, Router) {
    let state = test_state();
    state
        .holds
        .initialize_flight(FlightId(FLIGHT), &SeatMapLayout::new(2, "ABC"), 12_000)
        .await
        .unwrap();
    let router = app(state.clone());
    (state, router)
}

fn token(user: i64, role: &str) -> String {
    issue_token(SECRET, UserId(user), role, 3600).unwrap()
}

async fn call(router: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

async fn webhook(router: &Router, secret: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header("X-Webhook-Secret", secret);
    }

    let response = router.clone().oneshot(builder.body(Body::from(body.to_string())).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn seat_id(router: &Router, number: &str) -> i64 {
    let (_, map) = call(router, Method::GET, &format!("/v1/flights/{}/seats", FLIGHT), None, None).await;
    map["seats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["seat_number"] == number)
        .and_then(|s| s["id"].as_i64())
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let router = app(test_state());
    let (status, body) = call(&router, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_seat_map_is_public() {
    let (_, router) = seeded().await;

    let (status, body) = call(&router, Method::GET, "/v1/flights/500/seats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], 6);
    assert_eq!(body["seats"].as_array().unwrap().len(), 6);

    let (status, _) = call(&router, Method::GET, "/v1/flights/999/seats", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hold_requires_token() {
    let (_, router) = seeded().await;
    let seat = seat_id(&router, "1A").await;

    let uri = format!("/v1/flights/{}/seats/{}/hold", FLIGHT, seat);
    let (status, _) = call(&router, Method::POST, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&router, Method::POST, &uri, Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_competing_hold_conflicts() {
    let (_, router) = seeded().await;
    let seat = seat_id(&router, "1A").await;
    let uri = format!("/v1/flights/{}/seats/{}/hold", FLIGHT, seat);

    let (status, body) = call(&router, Method::POST, &uri, Some(&token(1, ROLE_CUSTOMER)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["hold_expires_at"].is_string());

    let (status, _) = call(&router, Method::POST, &uri, Some(&token(2, ROLE_CUSTOMER)), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Someone else's live hold stays put
    let (status, body) = call(&router, Method::DELETE, &uri, Some(&token(2, ROLE_CUSTOMER)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], false);

    let (_, body) = call(&router, Method::DELETE, &uri, Some(&token(1, ROLE_CUSTOMER)), None).await;
    assert_eq!(body["released"], true);
}

#[tokio::test]
async fn test_booking_lifecycle_over_http() {
    let (_, router) = seeded().await;
    let alice = token(1, ROLE_CUSTOMER);
    let seat = seat_id(&router, "2B").await;

    let hold_uri = format!("/v1/flights/{}/seats/{}/hold", FLIGHT, seat);
    let (status, _) = call(&router, Method::POST, &hold_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, booking) = call(
        &router,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(json!({ "flight_id": FLIGHT, "seat_ids": [seat] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "PENDING");
    assert_eq!(booking["total_amount"], 12_000);
    let booking_id = booking["id"].as_i64().unwrap();

    let (status, paid) =
        webhook(&router, Some(WEBHOOK_SECRET), json!({ "booking_id": booking_id, "status": "SUCCEEDED" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "PAID");

    // A repeated delivery must not apply twice
    let (status, _) =
        webhook(&router, Some(WEBHOOK_SECRET), json!({ "booking_id": booking_id, "status": "SUCCEEDED" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, map) = call(&router, Method::GET, "/v1/flights/500/seats", None, None).await;
    assert_eq!(map["available"], 5);

    let (status, listed) = call(&router, Method::GET, "/v1/bookings", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let cancel_uri = format!("/v1/bookings/{}/cancel", booking_id);
    let (status, cancelled) = call(&router, Method::POST, &cancel_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");

    let (_, map) = call(&router, Method::GET, "/v1/flights/500/seats", None, None).await;
    assert_eq!(map["available"], 6);
}

#[tokio::test]
async fn test_booking_without_hold_is_rejected() {
    let (_, router) = seeded().await;
    let seat = seat_id(&router, "1C").await;

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/bookings",
        Some(&token(1, ROLE_CUSTOMER)),
        Some(json!({ "flight_id": FLIGHT, "seat_ids": [seat] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/bookings",
        Some(&token(1, ROLE_CUSTOMER)),
        Some(json!({ "flight_id": FLIGHT, "seat_ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_users_bookings_are_hidden() {
    let (state, router) = seeded().await;
    let seat = seat_id(&router, "1A").await;

    state.holds.hold(SeatId(seat), FlightId(FLIGHT), UserId(1)).await.unwrap();
    let booking = state
        .bookings
        .create_booking(UserId(1), FlightId(FLIGHT), vec![SeatId(seat)], None)
        .await
        .unwrap();
    state.bookings.record_payment_result(booking.id, true).await.unwrap();

    let mallory = token(2, ROLE_CUSTOMER);
    let (status, _) = call(&router, Method::GET, &format!("/v1/bookings/{}", booking.id), Some(&mallory), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        call(&router, Method::POST, &format!("/v1/bookings/{}/cancel", booking.id), Some(&mallory), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_seat_map_routes() {
    let router = app(test_state());
    let uri = "/v1/admin/flights/700/seats";

    let (status, _) = call(&router, Method::POST, uri, Some(&token(1, ROLE_CUSTOMER)), Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token(99, ROLE_ADMIN);
    let (status, seats) = call(&router, Method::POST, uri, Some(&admin), Some(json!({ "rows": 3 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(seats.as_array().unwrap().len(), 9);

    let (status, _) = call(&router, Method::POST, uri, Some(&admin), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&router, Method::POST, "/v1/admin/flights/701/seats", Some(&admin), Some(json!({ "letters": "a1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&router, Method::DELETE, uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 9);
}

#[tokio::test]
async fn test_guest_token_can_hold() {
    let (_, router) = seeded().await;

    let (status, body) = call(&router, Method::POST, "/v1/auth/guest", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let guest = body["token"].as_str().unwrap().to_string();

    let seat = seat_id(&router, "2C").await;
    let (status, _) = call(
        &router,
        Method::POST,
        &format!("/v1/flights/{}/seats/{}/hold", FLIGHT, seat),
        Some(&guest),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_hold_tracked_for_stream_client() {
    let (state, router) = seeded().await;
    let seat = seat_id(&router, "1B").await;

    let _rx = state.bus.connect("tab-1", FlightId(FLIGHT), Some(UserId(1))).await.unwrap();
    let uri = format!("/v1/flights/{}/seats/{}/hold?client_id=tab-1", FLIGHT, seat);
    let (status, _) = call(&router, Method::POST, &uri, Some(&token(1, ROLE_CUSTOMER)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.bus.tracked_seats("tab-1").await, vec![SeatId(seat)]);

    assert_eq!(state.bus.on_client_disconnect("tab-1", FlightId(FLIGHT)).await, 1);
    let (_, map) = call(&router, Method::GET, "/v1/flights/500/seats", None, None).await;
    assert_eq!(map["available"], 6);
}

#[tokio::test]
async fn test_webhook_requires_provider_secret() {
    let (_, router) = seeded().await;
    let alice = token(1, ROLE_CUSTOMER);
    let seat = seat_id(&router, "1A").await;

    call(&router, Method::POST, &format!("/v1/flights/{}/seats/{}/hold", FLIGHT, seat), Some(&alice), None).await;
    let (_, booking) = call(
        &router,
        Method::POST,
        "/v1/bookings",
        Some(&alice),
        Some(json!({ "flight_id": FLIGHT, "seat_ids": [seat] })),
    )
    .await;
    let body = json!({ "booking_id": booking["id"], "status": "SUCCEEDED" });

    let (status, _) = webhook(&router, None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = webhook(&router, Some("guessed"), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A customer token is not a provider credential either
    let (status, _) = call(&router, Method::POST, "/v1/webhooks/payments", Some(&alice), Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, stored) = call(&router, Method::GET, &format!("/v1/bookings/{}", booking["id"]), Some(&alice), None).await;
    assert_eq!(stored["status"], "PENDING");
    let (_, map) = call(&router, Method::GET, "/v1/flights/500/seats", None, None).await;
    let seat_state = map["seats"].as_array().unwrap().iter().find(|s| s["id"] == seat).unwrap();
    assert_eq!(seat_state["state"], "RESERVED");
}

#[tokio::test]
async fn test_hold_with_unconnected_client_id_is_not_tracked() {
    let (state, router) = seeded().await;
    let alice = token(1, ROLE_CUSTOMER);
    let seat = seat_id(&router, "2A").await;

    let uri = format!("/v1/flights/{}/seats/{}/hold?client_id=never-streamed", FLIGHT, seat);
    let (status, _) = call(&router, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&router, Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(state.bus.client_count().await, 0);
}
