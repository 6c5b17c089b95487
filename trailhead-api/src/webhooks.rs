use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use trailhead_booking::PaymentNotification;

use crate::error::{ok, ApiResponse, AppError, AppResult};
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Serialize)]
struct Ack {
    accepted: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(payment_notification))
}

/// POST /webhooks/payments
///
/// Acknowledged immediately; the derived event is published in the
/// background.
async fn payment_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PaymentNotification>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Ack>>> {
    let secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if secret != Some(state.webhook_secret.as_str()) {
        warn!("Rejected payment webhook with bad secret");
        return Err(AppError::Unauthorized("Invalid webhook secret".to_string()));
    }
    let Json(notification) = body?;

    info!(
        event_code = %notification.event_code,
        success = notification.success,
        reference = %notification.merchant_reference,
        "Payment webhook received"
    );

    if let Some(event) = notification.normalise() {
        let payload = event.payload()?;
        let bus = state.bus.clone();
        tokio::spawn(async move {
            let report = bus.publish(event.name(), payload).await;
            if report.failed > 0 {
                warn!(event = event.name(), failed = report.failed, "Payment event handlers failed");
            }
        });
    }

    Ok(ok(Ack { accepted: true }))
}
