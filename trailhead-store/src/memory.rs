//! In-memory stores for tests and `storage.backend = "memory"`.
//!
//! Each store keeps its state behind one `tokio::sync::RwLock`, so the
//! compare-and-set operations of the repository traits hold for concurrent
//! callers exactly like the Postgres implementations.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use trailhead_core::coordination::{ExecutionHistory, ExecutionRecord, LeaseStore};
use trailhead_core::repository::{
    BookingFilter, BookingRepository, PoiRepository, StatusUpdate, StoreHealth, TicketRepository,
};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::{Booking, BookingStatus, Poi, PoiTier, Ticket, TicketStatus};

#[derive(Default)]
pub struct MemoryPoiRepository {
    pois: RwLock<HashMap<Uuid, Poi>>,
}

impl MemoryPoiRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pois(pois: Vec<Poi>) -> Self {
        Self {
            pois: RwLock::new(pois.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

#[async_trait]
impl PoiRepository for MemoryPoiRepository {
    async fn get_poi(&self, id: Uuid) -> CoreResult<Option<Poi>> {
        Ok(self.pois.read().await.get(&id).cloned())
    }

    async fn list_pois(&self) -> CoreResult<Vec<Poi>> {
        let mut pois: Vec<Poi> = self.pois.read().await.values().cloned().collect();
        pois.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pois)
    }

    async fn upsert_poi(&self, poi: &Poi) -> CoreResult<()> {
        self.pois.write().await.insert(poi.id, poi.clone());
        Ok(())
    }

    async fn set_tier(&self, id: Uuid, tier: PoiTier) -> CoreResult<()> {
        let mut pois = self.pois.write().await;
        let poi = pois.get_mut(&id).ok_or_else(|| CoreError::not_found("POI", id))?;
        poi.tier = tier;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn active_sum<'a>(
    bookings: impl Iterator<Item = &'a Booking>,
    poi_id: Uuid,
    date: NaiveDate,
    timeslot: Option<&str>,
) -> u32 {
    bookings
        .filter(|b| b.poi_id == poi_id && b.date == date && b.status.is_active())
        .filter(|b| timeslot.map_or(true, |slot| b.timeslot.as_deref() == Some(slot)))
        .map(|b| b.quantity)
        .sum()
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn active_quantity(
        &self,
        poi_id: Uuid,
        date: NaiveDate,
        timeslot: Option<&str>,
    ) -> CoreResult<u32> {
        let bookings = self.bookings.read().await;
        Ok(active_sum(bookings.values(), poi_id, date, timeslot))
    }

    async fn insert_if_capacity(&self, booking: &Booking, capacity: u32) -> CoreResult<()> {
        // Write lock held across sum and insert
        let mut bookings = self.bookings.write().await;
        let used = active_sum(
            bookings.values(),
            booking.poi_id,
            booking.date,
            booking.timeslot.as_deref(),
        );
        let available = capacity.saturating_sub(used);

        if booking.quantity > available {
            return Err(CoreError::AvailabilityExhausted {
                requested: booking.quantity,
                available,
            });
        }

        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut matched: Vec<Booking> = bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        update: &StatusUpdate,
    ) -> CoreResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(booking) if booking.status == expected => {
                booking.apply_status(
                    update.status,
                    update.payment_transaction_id.clone(),
                    update.cancellation_reason.clone(),
                    update.at,
                );
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_payment_session(&self, id: Uuid, session_id: &str) -> CoreResult<()> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Booking", id))?;
        booking.payment_session_id = Some(session_id.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn sold_quantity_since(&self, poi_id: Uuid, since: DateTime<Utc>) -> CoreResult<u64> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|b| b.poi_id == poi_id && b.created_at >= since)
            .filter(|b| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Completed))
            .map(|b| u64::from(b.quantity))
            .sum())
    }
}

#[derive(Default)]
pub struct MemoryTicketRepository {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
}

impl MemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketRepository for MemoryTicketRepository {
    async fn insert_for_booking_if_absent(
        &self,
        booking_id: Uuid,
        tickets: &[Ticket],
    ) -> CoreResult<Vec<Ticket>> {
        let mut store = self.tickets.write().await;
        let mut existing: Vec<Ticket> = store
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        if !existing.is_empty() {
            existing.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            return Ok(existing);
        }

        for ticket in tickets {
            if store.values().any(|t| t.validation_code == ticket.validation_code) {
                return Err(CoreError::InternalError(format!(
                    "duplicate validation code {}",
                    ticket.validation_code
                )));
            }
        }
        for ticket in tickets {
            store.insert(ticket.id, ticket.clone());
        }
        Ok(tickets.to_vec())
    }

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn find_by_code(&self, validation_code: &str) -> CoreResult<Option<Ticket>> {
        Ok(self
            .tickets
            .read()
            .await
            .values()
            .find(|t| t.validation_code == validation_code)
            .cloned())
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .read()
            .await
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tickets)
    }

    async fn mark_used(
        &self,
        id: Uuid,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Ticket>> {
        let mut tickets = self.tickets.write().await;
        match tickets.get_mut(&id) {
            Some(ticket) if ticket.status == TicketStatus::Active => {
                ticket.consume(device_id.map(str::to_string), at);
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn void_for_booking(&self, booking_id: Uuid) -> CoreResult<u64> {
        let mut tickets = self.tickets.write().await;
        let mut voided = 0;
        for ticket in tickets.values_mut() {
            if ticket.booking_id == booking_id && ticket.status == TicketStatus::Active {
                ticket.status = TicketStatus::Void;
                voided += 1;
            }
        }
        Ok(voided)
    }
}

/// Recent-history log with the same cap/expiry rules as the Redis list.
pub struct MemoryExecutionHistory {
    limit: usize,
    retention: Duration,
    records: RwLock<HashMap<String, VecDeque<ExecutionRecord>>>,
}

impl MemoryExecutionHistory {
    pub fn new(limit: usize, retention: Duration) -> Self {
        Self {
            limit: limit.max(1),
            retention,
            records: RwLock::new(HashMap::new()),
        }
    }

    fn is_expired(&self, record: &ExecutionRecord, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(record.finished_at);
        age.to_std().map_or(false, |age| age > self.retention)
    }
}

#[async_trait]
impl ExecutionHistory for MemoryExecutionHistory {
    async fn append(&self, record: &ExecutionRecord) -> CoreResult<()> {
        let mut records = self.records.write().await;
        let list = records.entry(record.workflow_id.clone()).or_default();
        list.push_front(record.clone());
        list.truncate(self.limit);
        Ok(())
    }

    async fn recent(&self, workflow_id: &str, limit: usize) -> CoreResult<Vec<ExecutionRecord>> {
        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records
            .get(workflow_id)
            .map(|list| {
                list.iter()
                    .filter(|r| !self.is_expired(r, now))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryLeaseStore {
    leases: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> CoreResult<bool> {
        let now = Utc::now();
        let mut leases = self.leases.write().await;
        if let Some((_, expires_at)) = leases.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        let ttl = chrono::Duration::from_std(ttl).map_err(CoreError::internal)?;
        leases.insert(key.to_string(), (owner.to_string(), now + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> CoreResult<()> {
        let mut leases = self.leases.write().await;
        if leases.get(key).map_or(false, |(holder, _)| holder == owner) {
            leases.remove(key);
        }
        Ok(())
    }
}

/// The in-memory backend is always reachable.
pub struct MemoryHealth;

#[async_trait]
impl StoreHealth for MemoryHealth {
    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }
}
