use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use trailhead_shared::{Booking, BookingStatus, Poi, PoiTier, Ticket};

use crate::CoreResult;

/// Repository trait for POI catalog access
#[async_trait]
pub trait PoiRepository: Send + Sync {
    async fn get_poi(&self, id: Uuid) -> CoreResult<Option<Poi>>;

    async fn list_pois(&self) -> CoreResult<Vec<Poi>>;

    async fn upsert_poi(&self, poi: &Poi) -> CoreResult<()>;

    async fn set_tier(&self, id: Uuid, tier: PoiTier) -> CoreResult<()>;
}

/// Read filters for booking listings. `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub user_id: Option<String>,
    pub poi_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub created_before: Option<DateTime<Utc>>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.user_id.as_deref().map_or(true, |u| booking.user_id == u)
            && self.poi_id.map_or(true, |p| booking.poi_id == p)
            && self.status.map_or(true, |s| booking.status == s)
            && self.from.map_or(true, |d| booking.date >= d)
            && self.to.map_or(true, |d| booking.date <= d)
            && self.created_before.map_or(true, |t| booking.created_at < t)
    }
}

/// Status change applied by [`BookingRepository::transition`].
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: BookingStatus,
    pub payment_transaction_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn to(status: BookingStatus) -> Self {
        Self {
            status,
            payment_transaction_id: None,
            cancellation_reason: None,
            at: Utc::now(),
        }
    }
}

/// Repository trait for the booking ledger
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Sum of PENDING + CONFIRMED quantities for a POI/date.
    ///
    /// `timeslot = None` sums every slot of the day.
    async fn active_quantity(
        &self,
        poi_id: Uuid,
        date: NaiveDate,
        timeslot: Option<&str>,
    ) -> CoreResult<u32>;

    /// Insert a pending booking only if the active quantity for its
    /// POI/date/timeslot plus `booking.quantity` stays within `capacity`.
    ///
    /// The sum and the insert are atomic with respect to other callers.
    /// Fails with `CoreError::AvailabilityExhausted` otherwise.
    async fn insert_if_capacity(&self, booking: &Booking, capacity: u32) -> CoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>>;

    /// Compare-and-set on status: applies `update` only when the stored
    /// status equals `expected`. Returns the updated booking, or `None` when
    /// the booking is missing or its status moved on.
    async fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        update: &StatusUpdate,
    ) -> CoreResult<Option<Booking>>;

    async fn set_payment_session(&self, id: Uuid, session_id: &str) -> CoreResult<()>;

    /// Units sold (confirmed or completed) for a POI since a point in time.
    async fn sold_quantity_since(&self, poi_id: Uuid, since: DateTime<Utc>) -> CoreResult<u64>;
}

/// Repository trait for issued tickets
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Store `tickets` for a booking unless that booking already has
    /// tickets. Returns the booking's stored tickets either way.
    ///
    /// The check and the insert are atomic with respect to other callers,
    /// so concurrent issuers of one booking end up with a single set.
    async fn insert_for_booking_if_absent(
        &self,
        booking_id: Uuid,
        tickets: &[Ticket],
    ) -> CoreResult<Vec<Ticket>>;

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>>;

    async fn find_by_code(&self, validation_code: &str) -> CoreResult<Option<Ticket>>;

    async fn list_for_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>>;

    /// Compare-and-set ACTIVE → USED. `None` if the ticket was not active.
    async fn mark_used(
        &self,
        id: Uuid,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Ticket>>;

    /// Void every active ticket of a booking; returns how many changed.
    async fn void_for_booking(&self, booking_id: Uuid) -> CoreResult<u64>;
}

/// Liveness check for the backing store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> CoreResult<()>;
}
