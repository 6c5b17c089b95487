//! Postgres repository tests against a real database.
//!
//! Marked `#[ignore]` because they need a reachable Postgres in
//! `DATABASE_URL`; `sqlx::test` creates a throwaway database per test and
//! applies `migrations/`. Run with:
//! ```bash
//! DATABASE_URL=postgres://localhost/trailhead cargo test -p trailhead-store --test postgres_repos -- --ignored
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trailhead_core::repository::{BookingRepository, PoiRepository, StatusUpdate, TicketRepository};
use trailhead_core::CoreError;
use trailhead_shared::{Booking, BookingStatus, GuestInfo, Masked, Poi, PoiTier, Ticket, TicketStatus};
use trailhead_store::{StoreBookingRepository, StorePoiRepository, StoreTicketRepository};

async fn seed_poi(pool: &PgPool, capacity: u32) -> Poi {
    let poi = Poi {
        id: Uuid::new_v4(),
        name: "Quarry Trail".to_string(),
        slug: format!("quarry-{}", Uuid::new_v4().simple()),
        daily_capacity: capacity,
        timeslots: vec![],
        base_price: 1200,
        currency: "EUR".to_string(),
        tier: PoiTier::Tier4,
        is_active: true,
    };
    StorePoiRepository::new(pool.clone()).upsert_poi(&poi).await.unwrap();
    poi
}

fn pending(poi: &Poi, quantity: u32) -> Booking {
    Booking::new(
        format!("TH-{}", &Uuid::new_v4().simple().to_string()[..8]),
        "user-1".to_string(),
        GuestInfo {
            name: "Ida".to_string(),
            email: Masked::new("ida@example.com".to_string()),
            phone: None,
        },
        poi.id,
        NaiveDate::from_ymd_opt(2031, 6, 1).unwrap(),
        None,
        quantity,
        poi.base_price,
        poi.currency.clone(),
    )
}

fn tickets_for(booking: &Booking) -> Vec<Ticket> {
    (0..booking.quantity)
        .map(|_| {
            let code = format!("TKT-{}", Uuid::new_v4().simple());
            Ticket::new(
                booking.id,
                booking.poi_id,
                booking.guest.name.clone(),
                booking.guest.email.expose().clone(),
                code.clone(),
                code,
            )
        })
        .collect()
}

#[sqlx::test(migrations = "../migrations")]
#[ignore]
async fn test_concurrent_reservations_respect_capacity(pool: PgPool) {
    let poi = seed_poi(&pool, 3).await;
    let a = StoreBookingRepository::new(pool.clone());
    let b = StoreBookingRepository::new(pool.clone());
    let first = pending(&poi, 2);
    let second = pending(&poi, 2);

    let (r1, r2) = tokio::join!(a.insert_if_capacity(&first, 3), b.insert_if_capacity(&second, 3));

    let results = [r1, r2];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CoreError::AvailabilityExhausted { available: 1, .. }))));
    assert_eq!(a.active_quantity(poi.id, first.date, None).await.unwrap(), 2);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore]
async fn test_transition_is_compare_and_set(pool: PgPool) {
    let poi = seed_poi(&pool, 10).await;
    let repo = StoreBookingRepository::new(pool.clone());
    let booking = pending(&poi, 1);
    repo.insert_if_capacity(&booking, 10).await.unwrap();

    let mut confirm = StatusUpdate::to(BookingStatus::Confirmed);
    confirm.payment_transaction_id = Some("psp_db".to_string());
    let confirmed = repo
        .transition(booking.id, BookingStatus::Pending, &confirm)
        .await
        .unwrap()
        .expect("first transition wins");
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());

    // Stale expectation loses
    assert!(repo
        .transition(booking.id, BookingStatus::Pending, &confirm)
        .await
        .unwrap()
        .is_none());

    let mut cancel = StatusUpdate::to(BookingStatus::Cancelled);
    cancel.cancellation_reason = Some("weather".to_string());
    let cancelled = repo
        .transition(booking.id, BookingStatus::Confirmed, &cancel)
        .await
        .unwrap()
        .expect("cancel from confirmed");
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("weather"));
    assert!(cancelled.cancelled_at.is_some());
    // Transaction id survives the cancellation for the refund
    assert_eq!(cancelled.payment_transaction_id.as_deref(), Some("psp_db"));
    assert_eq!(repo.active_quantity(poi.id, booking.date, None).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore]
async fn test_ticket_issue_and_single_use(pool: PgPool) {
    let poi = seed_poi(&pool, 10).await;
    let bookings = StoreBookingRepository::new(pool.clone());
    let booking = pending(&poi, 2);
    bookings.insert_if_capacity(&booking, 10).await.unwrap();

    let a = StoreTicketRepository::new(pool.clone());
    let b = StoreTicketRepository::new(pool.clone());
    let first_set = tickets_for(&booking);
    let second_set = tickets_for(&booking);
    let (r1, r2) = tokio::join!(
        a.insert_for_booking_if_absent(booking.id, &first_set),
        b.insert_for_booking_if_absent(booking.id, &second_set),
    );
    let (r1, r2) = (r1.unwrap(), r2.unwrap());

    let stored = a.list_for_booking(booking.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    let mut ids: Vec<Uuid> = stored.iter().map(|t| t.id).collect();
    ids.sort();
    for set in [r1, r2] {
        let mut got: Vec<Uuid> = set.iter().map(|t| t.id).collect();
        got.sort();
        assert_eq!(got, ids);
    }

    let ticket = &stored[0];
    let used = a
        .mark_used(ticket.id, Some("gate-3"), Utc::now())
        .await
        .unwrap()
        .expect("active ticket is consumed");
    assert_eq!(used.status, TicketStatus::Used);
    assert_eq!(used.validator_device_id.as_deref(), Some("gate-3"));
    assert!(a.mark_used(ticket.id, None, Utc::now()).await.unwrap().is_none());

    // Only the remaining active ticket is voided
    assert_eq!(a.void_for_booking(booking.id).await.unwrap(), 1);
}
