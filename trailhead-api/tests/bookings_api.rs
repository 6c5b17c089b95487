mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_health_reports_database_up() {
    let app = build_test_app().await;
    let (status, body) = send(&app.router, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "up");
}

#[tokio::test]
async fn test_guest_login_issues_token() {
    let app = build_test_app().await;
    let (status, body) = send(&app.router, Method::POST, "/auth/guest", None, None).await;

    assert_eq!(status, StatusCode::CREATED);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert!(body["data"]["userId"].as_str().unwrap().starts_with("guest-"));

    let (status, _) = send(&app.router, Method::GET, "/bookings", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bookings_require_a_token() {
    let app = build_test_app().await;
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/bookings",
        None,
        Some(booking_body(app.poi.id, 1)),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_missing_email_names_the_field() {
    let app = build_test_app().await;
    let mut body = booking_body(app.poi.id, 1);
    body["guestInfo"] = json!({ "name": "Robin Vale" });

    let (status, reply) = send(
        &app.router,
        Method::POST,
        "/bookings",
        Some(&token("user-1", "CUSTOMER")),
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["code"], "VALIDATION_ERROR");
    assert_eq!(reply["field"], "guestInfo.email");
}

#[tokio::test]
async fn test_concurrent_bookings_never_oversell() {
    let app = build_test_app_with_capacity(2).await;
    let first_token = token("user-a", "CUSTOMER");
    let second_token = token("user-b", "CUSTOMER");

    let (first, second) = tokio::join!(
        send(
            &app.router,
            Method::POST,
            "/bookings",
            Some(&first_token),
            Some(booking_body(app.poi.id, 2)),
        ),
        send(
            &app.router,
            Method::POST,
            "/bookings",
            Some(&second_token),
            Some(booking_body(app.poi.id, 2)),
        ),
    );

    let statuses = [first.0, second.0];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 1);
    let rejected = if first.0 == StatusCode::CREATED { &second.1 } else { &first.1 };
    assert_eq!(rejected["code"], "AVAILABILITY_EXHAUSTED");
}

#[tokio::test]
async fn test_availability_reflects_pending_bookings() {
    let app = build_test_app_with_capacity(5).await;
    create_booking(&app, &token("user-1", "CUSTOMER"), 3).await;

    let uri = format!("/availability/{}?date={}", app.poi.id, tomorrow());
    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["capacity"]["total"], 5);
    assert_eq!(body["data"]["capacity"]["available"], 2);
    assert_eq!(body["data"]["pricing"]["unitPrice"], 1200);
}

#[tokio::test]
async fn test_blank_timeslot_means_whole_day() {
    let app = build_test_app_with_capacity(5).await;

    let uri = format!("/availability/{}?date={}&timeslot=", app.poi.id, tomorrow());
    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["capacity"]["total"], 5);

    let uri = format!("/availability/{}/range?from=2031-03-01&to=2031-03-02&timeslot=", app.poi.id);
    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let uri = format!("/availability/{}?date={}&timeslot=09:00", app.poi.id, tomorrow());
    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "timeslot");
}

#[tokio::test]
async fn test_availability_range_is_inclusive() {
    let app = build_test_app().await;
    let uri = format!("/availability/{}/range?from=2031-03-01&to=2031-03-07", app.poi.id);
    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_unknown_poi_is_not_found() {
    let app = build_test_app().await;
    let uri = format!("/availability/{}?date={}", uuid::Uuid::new_v4(), tomorrow());
    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_confirm_twice_is_rejected() {
    let app = build_test_app().await;
    let owner = token("user-1", "CUSTOMER");
    let created = create_booking(&app, &owner, 2).await;
    let uri = format!("/bookings/{}/confirm", created["bookingId"].as_str().unwrap());

    let (status, body) = send(
        &app.router,
        Method::POST,
        &uri,
        Some(&owner),
        Some(json!({ "paymentTransactionId": "psp_100" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["booking"]["status"], "CONFIRMED");
    assert_eq!(body["data"]["tickets"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app.router,
        Method::POST,
        &uri,
        Some(&owner),
        Some(json!({ "paymentTransactionId": "psp_100" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");

    let tickets_uri = format!("/bookings/{}/tickets", created["bookingId"].as_str().unwrap());
    let (_, tickets) = send(&app.router, Method::GET, &tickets_uri, Some(&owner), None).await;
    assert_eq!(tickets["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_confirm_without_transaction_id() {
    let app = build_test_app().await;
    let owner = token("user-1", "CUSTOMER");
    let created = create_booking(&app, &owner, 1).await;
    let uri = format!("/bookings/{}/confirm", created["bookingId"].as_str().unwrap());

    let (status, body) = send(&app.router, Method::POST, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "paymentTransactionId");
}

#[tokio::test]
async fn test_other_users_are_forbidden() {
    let app = build_test_app().await;
    let created = create_booking(&app, &token("user-1", "CUSTOMER"), 1).await;
    let uri = format!("/bookings/{}", created["bookingId"].as_str().unwrap());

    let (status, body) = send(&app.router, Method::GET, &uri, Some(&token("user-2", "CUSTOMER")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(&app.router, Method::GET, &uri, Some(&token("ops", "ADMIN")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PENDING");
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = build_test_app().await;
    let owner = token("user-1", "CUSTOMER");
    create_booking(&app, &owner, 1).await;
    let second = create_booking(&app, &owner, 1).await;
    send(
        &app.router,
        Method::PUT,
        &format!("/bookings/{}/cancel", second["bookingId"].as_str().unwrap()),
        Some(&owner),
        None,
    )
    .await;

    let (status, body) = send(&app.router, Method::GET, "/bookings?status=CANCELLED", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], second["bookingId"]);

    let (status, body) = send(&app.router, Method::GET, "/bookings?status=LOST", Some(&owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "status");
}
