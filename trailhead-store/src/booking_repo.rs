use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use trailhead_core::repository::{BookingFilter, BookingRepository, StatusUpdate};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::{Booking, BookingStatus, GuestInfo, Masked};

use crate::database::db_error;

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_reference: String,
    user_id: String,
    guest_name: String,
    guest_email: String,
    guest_phone: Option<String>,
    poi_id: Uuid,
    booking_date: NaiveDate,
    timeslot: Option<String>,
    quantity: i32,
    unit_price: i64,
    total_price: i64,
    currency: String,
    status: String,
    payment_session_id: Option<String>,
    payment_transaction_id: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            booking_reference: row.booking_reference,
            user_id: row.user_id,
            guest: GuestInfo {
                name: row.guest_name,
                email: Masked::new(row.guest_email),
                phone: row.guest_phone,
            },
            poi_id: row.poi_id,
            date: row.booking_date,
            timeslot: row.timeslot,
            quantity: u32::try_from(row.quantity).map_err(CoreError::internal)?,
            unit_price: row.unit_price,
            total_price: row.total_price,
            currency: row.currency,
            status: row.status.parse().map_err(CoreError::internal)?,
            payment_session_id: row.payment_session_id,
            payment_transaction_id: row.payment_transaction_id,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            confirmed_at: row.confirmed_at,
            cancelled_at: row.cancelled_at,
            completed_at: row.completed_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, booking_reference, user_id, guest_name, guest_email, guest_phone, \
     poi_id, booking_date, timeslot, quantity, unit_price, total_price, currency, status, \
     payment_session_id, payment_transaction_id, cancellation_reason, \
     created_at, updated_at, confirmed_at, cancelled_at, completed_at";

/// Sums active quantities; `$3 IS NULL` widens to the whole day.
const ACTIVE_SUM_SQL: &str = r#"
    SELECT COALESCE(SUM(quantity), 0)::BIGINT
    FROM bookings
    WHERE poi_id = $1
      AND booking_date = $2
      AND ($3::TEXT IS NULL OR timeslot = $3)
      AND status IN ('PENDING', 'CONFIRMED')
"#;

fn slot_lock_key(poi_id: Uuid, date: NaiveDate, timeslot: Option<&str>) -> String {
    format!("{}:{}:{}", poi_id, date, timeslot.unwrap_or("*"))
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn active_quantity(
        &self,
        poi_id: Uuid,
        date: NaiveDate,
        timeslot: Option<&str>,
    ) -> CoreResult<u32> {
        let (sum,): (i64,) = sqlx::query_as(ACTIVE_SUM_SQL)
            .bind(poi_id)
            .bind(date)
            .bind(timeslot)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(u32::try_from(sum).unwrap_or(u32::MAX))
    }

    async fn insert_if_capacity(&self, booking: &Booking, capacity: u32) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Serialise writers of the same slot until commit
        let key = slot_lock_key(booking.poi_id, booking.date, booking.timeslot.as_deref());
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(&key)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let (used,): (i64,) = sqlx::query_as(ACTIVE_SUM_SQL)
            .bind(booking.poi_id)
            .bind(booking.date)
            .bind(booking.timeslot.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        let available = i64::from(capacity).saturating_sub(used).max(0);
        if i64::from(booking.quantity) > available {
            debug!(slot = %key, used, capacity, "Rejecting booking, slot exhausted");
            return Err(CoreError::AvailabilityExhausted {
                requested: booking.quantity,
                available: u32::try_from(available).unwrap_or(0),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (id, booking_reference, user_id, guest_name, guest_email, guest_phone,
                poi_id, booking_date, timeslot, quantity, unit_price, total_price, currency, status,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.booking_reference)
        .bind(&booking.user_id)
        .bind(&booking.guest.name)
        .bind(booking.guest.email.expose())
        .bind(&booking.guest.phone)
        .bind(booking.poi_id)
        .bind(booking.date)
        .bind(&booking.timeslot)
        .bind(i32::try_from(booking.quantity).map_err(CoreError::internal)?)
        .bind(booking.unit_price)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Vec<Booking>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM bookings WHERE TRUE", BOOKING_COLUMNS));

        if let Some(user_id) = &filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(poi_id) = filter.poi_id {
            query.push(" AND poi_id = ").push_bind(poi_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.from {
            query.push(" AND booking_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND booking_date <= ").push_bind(to);
        }
        if let Some(before) = filter.created_before {
            query.push(" AND created_at < ").push_bind(before);
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: BookingStatus,
        update: &StatusUpdate,
    ) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings SET
                status = $3,
                updated_at = $4,
                payment_transaction_id = COALESCE($5, payment_transaction_id),
                cancellation_reason = CASE WHEN $3 = 'CANCELLED' THEN $6 ELSE cancellation_reason END,
                confirmed_at = CASE WHEN $3 = 'CONFIRMED' THEN $4 ELSE confirmed_at END,
                cancelled_at = CASE WHEN $3 = 'CANCELLED' THEN $4 ELSE cancelled_at END,
                completed_at = CASE WHEN $3 = 'COMPLETED' THEN $4 ELSE completed_at END
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(update.at)
        .bind(&update.payment_transaction_id)
        .bind(&update.cancellation_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn set_payment_session(&self, id: Uuid, session_id: &str) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET payment_session_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Booking", id));
        }
        Ok(())
    }

    async fn sold_quantity_since(&self, poi_id: Uuid, since: DateTime<Utc>) -> CoreResult<u64> {
        let (sum,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM bookings
            WHERE poi_id = $1 AND created_at >= $2 AND status IN ('CONFIRMED', 'COMPLETED')
            "#,
        )
        .bind(poi_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(u64::try_from(sum).unwrap_or(0))
    }
}
