//! Booking lifecycle: pending → confirmed → completed, with cancellation
//! from pending or confirmed.
//!
//! Every status change is a compare-and-set in the repository, so two
//! concurrent callers can never both move the same booking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use trailhead_catalog::{inventory, AvailabilityEngine};
use trailhead_core::notify::Notifier;
use trailhead_core::payment::PaymentReceipt;
use trailhead_core::repository::{BookingFilter, BookingRepository, StatusUpdate};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::models::events::{
    BookingCancelledEvent, BookingConfirmedEvent, BookingCreatedEvent, RefundRequestedEvent,
    BOOKING_CANCELLED, BOOKING_CONFIRMED, BOOKING_CREATED, BOOKING_REFUND_REQUESTED,
};
use trailhead_shared::{Booking, BookingStatus, GuestInfo, Masked, Ticket};
use trailhead_workflow::EventBus;

use crate::codes;
use crate::payment::PaymentBridge;
use crate::tickets::TicketService;

pub const REASON_PAYMENT_SESSION_FAILED: &str = "payment_session_failed";
pub const REASON_HOLD_EXPIRED: &str = "hold_expired";

#[derive(Debug, Clone)]
pub struct BookingRules {
    pub max_quantity_per_booking: u32,
    pub reference_prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfoInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Raw booking request. Fields are optional so that a missing field is
/// reported by name instead of as a malformed body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub poi_id: Option<String>,
    pub date: Option<String>,
    pub timeslot: Option<String>,
    pub quantity: Option<u32>,
    pub guest_info: Option<GuestInfoInput>,
}

struct ValidRequest {
    poi_id: Uuid,
    date: NaiveDate,
    timeslot: Option<String>,
    quantity: u32,
    guest: GuestInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBooking {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub payment_url: String,
    pub status: BookingStatus,
    pub total_price: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBooking {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

/// What a payment authorisation did to its booking.
#[derive(Debug, Clone)]
pub enum Settlement {
    Confirmed(ConfirmedBooking),
    /// The booking was cancelled first; the payment was handed back.
    Released {
        booking: Booking,
        receipt: Option<PaymentReceipt>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub struct BookingService {
    availability: Arc<AvailabilityEngine>,
    bookings: Arc<dyn BookingRepository>,
    tickets: Arc<TicketService>,
    payments: Arc<PaymentBridge>,
    notifier: Arc<dyn Notifier>,
    bus: Arc<EventBus>,
    rules: BookingRules,
}

fn required(value: Option<String>, field: &str) -> CoreResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CoreError::validation(field, "is required")),
    }
}

impl BookingService {
    pub fn new(
        availability: Arc<AvailabilityEngine>,
        bookings: Arc<dyn BookingRepository>,
        tickets: Arc<TicketService>,
        payments: Arc<PaymentBridge>,
        notifier: Arc<dyn Notifier>,
        bus: Arc<EventBus>,
        rules: BookingRules,
    ) -> Self {
        Self {
            availability,
            bookings,
            tickets,
            payments,
            notifier,
            bus,
            rules,
        }
    }

    fn validate(&self, request: CreateBookingRequest) -> CoreResult<ValidRequest> {
        let poi_id = Uuid::parse_str(&required(request.poi_id, "poiId")?)
            .map_err(|_| CoreError::validation("poiId", "must be a UUID"))?;

        let date = NaiveDate::parse_from_str(&required(request.date, "date")?, "%Y-%m-%d")
            .map_err(|_| CoreError::validation("date", "must be YYYY-MM-DD"))?;
        if date < Utc::now().date_naive() {
            return Err(CoreError::validation("date", "must not be in the past"));
        }

        let quantity = request
            .quantity
            .ok_or_else(|| CoreError::validation("quantity", "is required"))?;
        if quantity == 0 || quantity > self.rules.max_quantity_per_booking {
            return Err(CoreError::validation(
                "quantity",
                format!("must be between 1 and {}", self.rules.max_quantity_per_booking),
            ));
        }

        let guest = request
            .guest_info
            .ok_or_else(|| CoreError::validation("guestInfo", "is required"))?;
        let name = required(guest.name, "guestInfo.name")?;
        let email = required(guest.email, "guestInfo.email")?;
        if !email.contains('@') {
            return Err(CoreError::validation("guestInfo.email", "must be a valid e-mail address"));
        }

        let timeslot = request
            .timeslot
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(ValidRequest {
            poi_id,
            date,
            timeslot,
            quantity,
            guest: GuestInfo {
                name,
                email: Masked::new(email),
                phone: guest.phone.filter(|p| !p.trim().is_empty()),
            },
        })
    }

    /// Validate, reserve capacity and open a payment session.
    pub async fn create_booking(&self, user_id: &str, request: CreateBookingRequest) -> CoreResult<CreatedBooking> {
        let request = self.validate(request)?;
        let poi = self.availability.active_poi(request.poi_id).await?;
        inventory::require_booking_slot(&poi, request.timeslot.as_deref())?;

        let availability = self
            .availability
            .check_poi(&poi, request.date, request.timeslot.as_deref())
            .await?;
        if availability.capacity.available < request.quantity {
            return Err(CoreError::AvailabilityExhausted {
                requested: request.quantity,
                available: availability.capacity.available,
            });
        }

        let booking = Booking::new(
            codes::booking_reference(&self.rules.reference_prefix),
            user_id.to_string(),
            request.guest,
            poi.id,
            request.date,
            request.timeslot,
            request.quantity,
            availability.pricing.unit_price,
            availability.pricing.currency.clone(),
        );

        // Re-checks capacity atomically with the insert
        self.bookings
            .insert_if_capacity(&booking, availability.capacity.total)
            .await?;
        info!(
            booking_id = %booking.id,
            reference = %booking.booking_reference,
            poi_id = %poi.id,
            quantity = booking.quantity,
            "Booking created"
        );

        self.bus
            .publish_event(
                BOOKING_CREATED,
                &BookingCreatedEvent {
                    booking_id: booking.id,
                    booking_reference: booking.booking_reference.clone(),
                    poi_id: booking.poi_id,
                    quantity: booking.quantity,
                    total_price: booking.total_price,
                    currency: booking.currency.clone(),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;

        let session = match self.payments.create_session(&booking).await {
            Ok(session) => session,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Payment session failed, releasing booking");
                let mut update = StatusUpdate::to(BookingStatus::Cancelled);
                update.cancellation_reason = Some(REASON_PAYMENT_SESSION_FAILED.to_string());
                self.bookings
                    .transition(booking.id, BookingStatus::Pending, &update)
                    .await?;
                return Err(CoreError::UpstreamError(format!("payment session could not be created: {}", e)));
            }
        };
        self.bookings.set_payment_session(booking.id, &session.id).await?;

        Ok(CreatedBooking {
            booking_id: booking.id,
            booking_reference: booking.booking_reference,
            payment_url: session.redirect_url,
            status: booking.status,
            total_price: booking.total_price,
            currency: booking.currency,
        })
    }

    pub async fn get_booking_by_id(&self, id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking", id))
    }

    pub async fn get_bookings_by_user(&self, user_id: &str, query: BookingQuery) -> CoreResult<Vec<Booking>> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(CoreError::validation("from", "from must not be after to"));
            }
        }
        self.bookings
            .list_bookings(&BookingFilter {
                user_id: Some(user_id.to_string()),
                status: query.status,
                from: query.from,
                to: query.to,
                ..BookingFilter::default()
            })
            .await
    }

    /// Apply `update` if the booking is still `expected`; otherwise report
    /// the transition from whatever status it has now.
    async fn transition(&self, id: Uuid, expected: BookingStatus, update: StatusUpdate) -> CoreResult<Booking> {
        if let Some(booking) = self.bookings.transition(id, expected, &update).await? {
            return Ok(booking);
        }
        let current = self.get_booking_by_id(id).await?;
        Err(CoreError::transition(current.status, update.status))
    }

    pub async fn confirm_booking(&self, id: Uuid, payment_transaction_id: &str) -> CoreResult<ConfirmedBooking> {
        let payment_transaction_id = payment_transaction_id.trim();
        if payment_transaction_id.is_empty() {
            return Err(CoreError::validation("paymentTransactionId", "is required"));
        }

        let current = self.get_booking_by_id(id).await?;
        if current.status != BookingStatus::Pending {
            return Err(CoreError::transition(current.status, BookingStatus::Confirmed));
        }

        let mut update = StatusUpdate::to(BookingStatus::Confirmed);
        update.payment_transaction_id = Some(payment_transaction_id.to_string());
        let booking = self.transition(id, BookingStatus::Pending, update).await?;

        let tickets = self.tickets.issue_for_booking(&booking).await?;
        info!(booking_id = %id, tickets = tickets.len(), "Booking confirmed");

        self.bus
            .publish_event(
                BOOKING_CONFIRMED,
                &BookingConfirmedEvent {
                    booking_id: booking.id,
                    payment_transaction_id: payment_transaction_id.to_string(),
                    ticket_ids: tickets.iter().map(|t| t.id).collect(),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;

        Ok(ConfirmedBooking { booking, tickets })
    }

    /// Apply an authorised payment to a booking (webhook path).
    ///
    /// A pending booking is captured and confirmed. A booking that is
    /// already confirmed returns its existing tickets. A booking cancelled
    /// before the payment arrived gets the payment voided, or refunded when
    /// the capture already went through.
    pub async fn settle_payment(&self, id: Uuid, payment_transaction_id: &str) -> CoreResult<Settlement> {
        let payment_transaction_id = payment_transaction_id.trim();
        if payment_transaction_id.is_empty() {
            return Err(CoreError::validation("paymentTransactionId", "is required"));
        }

        let booking = self.get_booking_by_id(id).await?;
        if booking.status != BookingStatus::Pending {
            return self.settle_existing(booking, payment_transaction_id, false).await;
        }

        self.payments
            .capture(payment_transaction_id, booking.total_price, &booking.currency)
            .await?;
        match self.confirm_booking(id, payment_transaction_id).await {
            Ok(confirmed) => Ok(Settlement::Confirmed(confirmed)),
            // Moved on between the read and the compare-and-set
            Err(CoreError::InvalidTransition { .. }) => {
                let booking = self.get_booking_by_id(id).await?;
                self.settle_existing(booking, payment_transaction_id, true).await
            }
            Err(e) => Err(e),
        }
    }

    async fn settle_existing(
        &self,
        booking: Booking,
        payment_transaction_id: &str,
        captured: bool,
    ) -> CoreResult<Settlement> {
        match booking.status {
            BookingStatus::Confirmed | BookingStatus::Completed => {
                let tickets = self.tickets.issue_for_booking(&booking).await?;
                Ok(Settlement::Confirmed(ConfirmedBooking { booking, tickets }))
            }
            // Payment that confirmed this booking; its refund runs on cancellation
            BookingStatus::Cancelled
                if booking.payment_transaction_id.as_deref() == Some(payment_transaction_id) =>
            {
                Ok(Settlement::Released { booking, receipt: None })
            }
            BookingStatus::Cancelled => {
                let receipt = if captured {
                    self.payments
                        .refund(payment_transaction_id, booking.total_price, &booking.currency)
                        .await?
                } else {
                    self.payments.cancel(payment_transaction_id).await?
                };
                warn!(
                    booking_id = %booking.id,
                    transaction_id = payment_transaction_id,
                    reason = ?booking.cancellation_reason,
                    reference = %receipt.reference,
                    "Payment arrived for a cancelled booking, released"
                );
                Ok(Settlement::Released {
                    booking,
                    receipt: Some(receipt),
                })
            }
            BookingStatus::Pending => Err(CoreError::transition(booking.status, BookingStatus::Confirmed)),
        }
    }

    pub async fn cancel_booking(&self, id: Uuid, reason: Option<String>) -> CoreResult<Booking> {
        let current = self.get_booking_by_id(id).await?;
        if !current.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(CoreError::transition(current.status, BookingStatus::Cancelled));
        }
        let previous = current.status;

        let mut update = StatusUpdate::to(BookingStatus::Cancelled);
        update.cancellation_reason = reason.clone();
        let booking = self.transition(id, previous, update).await?;

        self.tickets.void_for_booking(id).await?;
        info!(booking_id = %id, from = %previous, ?reason, "Booking cancelled");

        self.bus
            .publish_event(
                BOOKING_CANCELLED,
                &BookingCancelledEvent {
                    booking_id: id,
                    previous_status: previous.to_string(),
                    reason,
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;

        // Only the caller that won the transition gets here
        if previous == BookingStatus::Confirmed {
            self.bus
                .publish_event(
                    BOOKING_REFUND_REQUESTED,
                    &RefundRequestedEvent {
                        booking_id: id,
                        payment_transaction_id: booking.payment_transaction_id.clone(),
                        amount: booking.total_price,
                        currency: booking.currency.clone(),
                        timestamp: Utc::now().timestamp(),
                    },
                )
                .await;
        }

        Ok(booking)
    }

    pub async fn complete_booking(&self, id: Uuid) -> CoreResult<Booking> {
        let current = self.get_booking_by_id(id).await?;
        if current.status != BookingStatus::Confirmed {
            return Err(CoreError::transition(current.status, BookingStatus::Completed));
        }
        self.transition(id, BookingStatus::Confirmed, StatusUpdate::to(BookingStatus::Completed))
            .await
    }

    /// Cancel pending bookings created more than `older_than` ago; returns
    /// how many.
    pub async fn expire_stale_pending(&self, older_than: Duration) -> CoreResult<usize> {
        let hold = chrono::Duration::from_std(older_than).map_err(CoreError::internal)?;
        let stale = self
            .bookings
            .list_bookings(&BookingFilter {
                status: Some(BookingStatus::Pending),
                created_before: Some(Utc::now() - hold),
                ..BookingFilter::default()
            })
            .await?;

        let mut expired = 0;
        for booking in stale {
            let mut update = StatusUpdate::to(BookingStatus::Cancelled);
            update.cancellation_reason = Some(REASON_HOLD_EXPIRED.to_string());
            if self
                .bookings
                .transition(booking.id, BookingStatus::Pending, &update)
                .await?
                .is_some()
            {
                expired += 1;
                self.bus
                    .publish_event(
                        BOOKING_CANCELLED,
                        &BookingCancelledEvent {
                            booking_id: booking.id,
                            previous_status: BookingStatus::Pending.to_string(),
                            reason: Some(REASON_HOLD_EXPIRED.to_string()),
                            timestamp: Utc::now().timestamp(),
                        },
                    )
                    .await;
            }
        }

        if expired > 0 {
            info!(expired, "Expired stale pending bookings");
        }
        Ok(expired)
    }

    /// Complete confirmed bookings dated before `today`; returns how many.
    pub async fn complete_past_bookings(&self, today: NaiveDate) -> CoreResult<usize> {
        let Some(yesterday) = today.pred_opt() else {
            return Ok(0);
        };
        let past = self
            .bookings
            .list_bookings(&BookingFilter {
                status: Some(BookingStatus::Confirmed),
                to: Some(yesterday),
                ..BookingFilter::default()
            })
            .await?;

        let mut completed = 0;
        for booking in past {
            if self
                .bookings
                .transition(booking.id, BookingStatus::Confirmed, &StatusUpdate::to(BookingStatus::Completed))
                .await?
                .is_some()
            {
                completed += 1;
            }
        }

        if completed > 0 {
            info!(completed, "Completed past bookings");
        }
        Ok(completed)
    }

    /// Open a fresh payment session for a still-pending booking and mail
    /// the guest a link. `None` when the booking no longer needs payment.
    pub async fn recover_payment(&self, id: Uuid) -> CoreResult<Option<String>> {
        let booking = self.get_booking_by_id(id).await?;
        if booking.status != BookingStatus::Pending {
            info!(booking_id = %id, status = %booking.status, "Payment recovery not needed");
            return Ok(None);
        }

        let session = self.payments.create_session(&booking).await?;
        self.bookings.set_payment_session(id, &session.id).await?;
        self.notifier
            .send_payment_retry(booking.guest.email.expose(), &booking, &session.redirect_url)
            .await?;
        Ok(Some(session.redirect_url))
    }

    /// Refund the captured amount of a cancelled booking.
    pub async fn process_refund(&self, id: Uuid) -> CoreResult<Option<PaymentReceipt>> {
        let booking = self.get_booking_by_id(id).await?;
        if booking.status != BookingStatus::Cancelled {
            return Err(CoreError::transition(booking.status, "REFUNDED"));
        }
        let Some(transaction_id) = booking.payment_transaction_id.as_deref() else {
            warn!(booking_id = %id, "No payment transaction to refund");
            return Ok(None);
        };
        let receipt = self
            .payments
            .refund(transaction_id, booking.total_price, &booking.currency)
            .await?;
        Ok(Some(receipt))
    }
}
