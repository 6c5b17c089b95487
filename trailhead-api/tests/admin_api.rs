mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = build_test_app().await;

    let (status, _) = send(&app.router, Method::GET, "/admin/workflows", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/admin/workflows",
        Some(&token("user-1", "CUSTOMER")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_lists_registered_workflows() {
    let app = build_test_app().await;
    let (status, body) = send(&app.router, Method::GET, "/admin/workflows", Some(&token("ops", "ADMIN")), None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_str().unwrap())
        .collect();
    for expected in [
        "ticket-delivery",
        "payment-recovery",
        "refund-processing",
        "booking-cleanup",
        "booking-completion",
        "poi-tier-reclassification",
    ] {
        assert!(ids.contains(&expected), "missing workflow {}", expected);
    }
}

#[tokio::test]
async fn test_trigger_job_records_history() {
    let app = build_test_app().await;
    let admin = token("ops", "ADMIN");

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/admin/jobs/booking-cleanup/trigger",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ran"], true);
    assert_eq!(body["data"]["outcome"]["output"]["expired"], 0);

    let (status, body) = send(
        &app.router,
        Method::GET,
        "/admin/workflows/booking-cleanup/history?limit=5",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "SUCCEEDED");
}

#[tokio::test]
async fn test_unknown_job_and_workflow_are_not_found() {
    let app = build_test_app().await;
    let admin = token("ops", "ADMIN");

    let (status, _) = send(&app.router, Method::POST, "/admin/jobs/nightly-report/trigger", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/admin/workflows/nightly-report/execute",
        Some(&admin),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_execution_surfaces_handler_failure() {
    let app = build_test_app().await;
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/admin/workflows/refund-processing/execute",
        Some(&token("ops", "ADMIN")),
        Some(json!({ "bookingId": "not-a-uuid" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "WORKFLOW_FAILED");
}
