use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use tracing::info;

use trailhead_booking::{BookingQuery, ConfirmedBooking, CreateBookingRequest, CreatedBooking};
use trailhead_core::CoreError;
use trailhead_shared::{Booking, BookingStatus, Ticket};

use crate::error::{ok, ApiResponse, AppResult};
use crate::middleware::Claims;
use crate::params;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest {
    payment_transaction_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}/tickets", get(booking_tickets))
        .route("/bookings/{booking_id}/confirm", post(confirm_booking))
        .route("/bookings/{booking_id}/cancel", put(cancel_booking))
}

/// Load a booking the caller may act on.
async fn owned_booking(state: &AppState, claims: &Claims, raw_id: &str) -> AppResult<Booking> {
    let id = params::uuid(raw_id, "bookingId")?;
    let booking = state.bookings.get_booking_by_id(id).await?;
    claims.ensure_owner(&booking.user_id)?;
    Ok(booking)
}

/// POST /bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<CreatedBooking>>)> {
    let Json(request) = body?;
    let created = state.bookings.create_booking(&claims.sub, request).await?;
    info!(booking_id = %created.booking_id, user = %claims.sub, "Booking accepted");
    Ok((StatusCode::CREATED, ok(created)))
}

/// GET /bookings?status=&from=&to=
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<Booking>>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<BookingStatus>())
        .transpose()
        .map_err(|e| CoreError::validation("status", e.to_string()))?;

    let bookings = state
        .bookings
        .get_bookings_by_user(
            &claims.sub,
            BookingQuery {
                status,
                from: params::optional_date(query.from.as_deref(), "from")?,
                to: params::optional_date(query.to.as_deref(), "to")?,
            },
        )
        .await?;
    Ok(ok(bookings))
}

/// GET /bookings/{booking_id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<String>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    Ok(ok(owned_booking(&state, &claims, &booking_id).await?))
}

/// GET /bookings/{booking_id}/tickets
async fn booking_tickets(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<Ticket>>>> {
    let booking = owned_booking(&state, &claims, &booking_id).await?;
    Ok(ok(state.tickets.tickets_for_booking(booking.id).await?))
}

/// POST /bookings/{booking_id}/confirm
async fn confirm_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<ConfirmedBooking>>> {
    let booking = owned_booking(&state, &claims, &booking_id).await?;
    let request: ConfirmRequest = params::optional_body(&body)?;

    let confirmed = state
        .bookings
        .confirm_booking(booking.id, request.payment_transaction_id.as_deref().unwrap_or_default())
        .await?;
    Ok(ok(confirmed))
}

/// PUT /bookings/{booking_id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let booking = owned_booking(&state, &claims, &booking_id).await?;
    let request: CancelRequest = params::optional_body(&body)?;

    let cancelled = state.bookings.cancel_booking(booking.id, request.reason).await?;
    Ok(ok(cancelled))
}
