use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use trailhead_booking::{TicketValidation, WalletPass};
use trailhead_core::CoreError;
use trailhead_shared::Ticket;

use crate::error::{ok, ApiResponse, AppResult};
use crate::middleware::Claims;
use crate::params;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct ResendRequest {
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResendResponse {
    sent: bool,
}

/// Gate scan. `qrCode` holds the scanned QR content or a typed-in code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    #[serde(alias = "qrData", alias = "code")]
    qr_code: Option<String>,
    poi_id: Option<String>,
    #[serde(alias = "deviceId")]
    validator_device_id: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tickets/validate", post(validate_ticket))
        .route("/tickets/{ticket_id}", get(get_ticket))
        .route("/tickets/{ticket_id}/resend", post(resend_ticket))
        .route("/tickets/{ticket_id}/wallet", post(wallet_pass))
}

async fn owned_ticket(state: &AppState, claims: &Claims, raw_id: &str) -> AppResult<Ticket> {
    let id = params::uuid(raw_id, "ticketId")?;
    let ticket = state.tickets.get_ticket(id).await?;
    let booking = state.bookings.get_booking_by_id(ticket.booking_id).await?;
    claims.ensure_owner(&booking.user_id)?;
    Ok(ticket)
}

/// GET /tickets/{ticket_id}
async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ticket_id): Path<String>,
) -> AppResult<Json<ApiResponse<Ticket>>> {
    Ok(ok(owned_ticket(&state, &claims, &ticket_id).await?))
}

/// POST /tickets/{ticket_id}/resend
async fn resend_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ticket_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<ResendResponse>>> {
    let ticket = owned_ticket(&state, &claims, &ticket_id).await?;
    let request: ResendRequest = params::optional_body(&body)?;

    state.tickets.resend(ticket.id, request.email.as_deref()).await?;
    Ok(ok(ResendResponse { sent: true }))
}

/// POST /tickets/{ticket_id}/wallet
async fn wallet_pass(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ticket_id): Path<String>,
) -> AppResult<Json<ApiResponse<WalletPass>>> {
    let ticket = owned_ticket(&state, &claims, &ticket_id).await?;
    Ok(ok(state.tickets.wallet_pass(ticket.id).await?))
}

/// POST /tickets/validate (validators and admins)
async fn validate_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<TicketValidation>>> {
    if !claims.can_validate() {
        return Err(CoreError::Forbidden("Validator role required".to_string()).into());
    }
    let Json(request) = body?;

    let scanned = request
        .qr_code
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CoreError::validation("qrCode", "is required"))?;
    let poi_id = params::uuid(
        request
            .poi_id
            .as_deref()
            .ok_or_else(|| CoreError::validation("poiId", "is required"))?,
        "poiId",
    )?;

    let validation = state
        .tickets
        .validate(scanned.trim(), poi_id, request.validator_device_id.as_deref())
        .await?;
    Ok(ok(validation))
}
