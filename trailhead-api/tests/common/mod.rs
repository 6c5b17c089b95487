#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use trailhead_api::middleware::issue_token;
use trailhead_api::webhooks::SECRET_HEADER;
use trailhead_api::{app, AppState};
use trailhead_booking::{LoggingNotifier, MockPaymentAdapter};
use trailhead_shared::{Poi, PoiTier};
use trailhead_store::{Config, Stores};

pub const JWT_SECRET: &str = "integration-secret";
pub const WEBHOOK_SECRET: &str = "integration-webhook";

const TEST_CONFIG: &str = r#"
    [server]
    port = 0

    [storage]
    backend = "memory"

    [database]
    url = "postgres://localhost/unused"

    [redis]
    url = "redis://127.0.0.1/"

    [auth]
    jwt_secret = "integration-secret"
    jwt_expiration_seconds = 3600

    [business_rules]
    pending_hold_seconds = 900
    max_quantity_per_booking = 10
    booking_reference_prefix = "TH"

    [payment]
    provider = "mock"
    return_url = "http://localhost/return"
    webhook_secret = "integration-webhook"

    [workflows]
    history_limit = 20
    history_retention_seconds = 3600
    default_timeout_ms = 2000
    default_max_retries = 1
    default_base_delay_ms = 10
    max_delay_ms = 50
    lease_ttl_seconds = 30
    scheduler_enabled = false
    email_concurrency = 2

    [pricing]
    demand_pricing = false
"#;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub poi: Poi,
    pub payments: Arc<MockPaymentAdapter>,
    pub notifier: Arc<LoggingNotifier>,
}

pub fn test_poi(daily_capacity: u32) -> Poi {
    Poi {
        id: Uuid::new_v4(),
        name: "Harbour Museum".to_string(),
        slug: "harbour-museum".to_string(),
        daily_capacity,
        timeslots: vec![],
        base_price: 1200,
        currency: "EUR".to_string(),
        tier: PoiTier::Tier3,
        is_active: true,
    }
}

/// Full router over in-memory stores seeded with one POI.
pub async fn build_test_app_with_capacity(daily_capacity: u32) -> TestApp {
    let config = Config::from_toml(TEST_CONFIG).expect("test config parses");
    let poi = test_poi(daily_capacity);
    let stores = Stores::memory_with_pois(&config.workflows, vec![poi.clone()]);
    let payments = Arc::new(MockPaymentAdapter::new());
    let notifier = Arc::new(LoggingNotifier::new());

    let state = AppState::build(&config, stores, payments.clone(), notifier.clone())
        .await
        .expect("state builds");

    TestApp {
        router: app(state.clone()),
        state,
        poi,
        payments,
        notifier,
    }
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with_capacity(20).await
}

pub fn token(subject: &str, role: &str) -> String {
    issue_token(JWT_SECRET, subject, role, 3600).expect("token encodes")
}

pub fn tomorrow() -> String {
    (Utc::now().date_naive() + chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string()
}

pub fn booking_body(poi_id: Uuid, quantity: u32) -> Value {
    json!({
        "poiId": poi_id,
        "date": tomorrow(),
        "quantity": quantity,
        "guestInfo": { "name": "Robin Vale", "email": "robin@example.com" },
    })
}

/// Send one request through the router and parse the JSON reply.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_with_headers(router, method, uri, token, &[], body).await
}

pub async fn send_with_headers(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
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
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn create_booking(app: &TestApp, token: &str, quantity: u32) -> Value {
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/bookings",
        Some(token),
        Some(booking_body(app.poi.id, quantity)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    body["data"].clone()
}

pub async fn post_webhook(app: &TestApp, notification: Value) -> (StatusCode, Value) {
    send_with_headers(
        &app.router,
        Method::POST,
        "/webhooks/payments",
        None,
        &[(SECRET_HEADER, WEBHOOK_SECRET)],
        Some(notification),
    )
    .await
}

/// Poll until `check` holds; background workflows settle asynchronously.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
