use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use sqlx::PgPool;

use trailhead_core::repository::TicketRepository;
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::Ticket;

use crate::database::db_error;

pub struct StoreTicketRepository {
    pool: PgPool,
}

impl StoreTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    booking_id: Uuid,
    poi_id: Uuid,
    holder_name: String,
    holder_email: String,
    validation_code: String,
    qr_payload: String,
    status: String,
    used_at: Option<DateTime<Utc>>,
    validator_device_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = CoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            booking_id: row.booking_id,
            poi_id: row.poi_id,
            holder_name: row.holder_name,
            holder_email: row.holder_email,
            validation_code: row.validation_code,
            qr_payload: row.qr_payload,
            status: row.status.parse().map_err(CoreError::internal)?,
            used_at: row.used_at,
            validator_device_id: row.validator_device_id,
            created_at: row.created_at,
        })
    }
}

fn issue_lock_key(booking_id: Uuid) -> String {
    format!("tickets:{}", booking_id)
}

const TICKET_COLUMNS: &str = "id, booking_id, poi_id, holder_name, holder_email, validation_code, \
     qr_payload, status, used_at, validator_device_id, created_at";

#[async_trait]
impl TicketRepository for StoreTicketRepository {
    async fn insert_for_booking_if_absent(
        &self,
        booking_id: Uuid,
        tickets: &[Ticket],
    ) -> CoreResult<Vec<Ticket>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // Serialise issuers of the same booking until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(issue_lock_key(booking_id))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let existing = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE booking_id = $1 ORDER BY created_at, id",
            TICKET_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        if !existing.is_empty() {
            tx.commit().await.map_err(db_error)?;
            return existing.into_iter().map(Ticket::try_from).collect();
        }

        for ticket in tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (id, booking_id, poi_id, holder_name, holder_email, validation_code,
                    qr_payload, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(ticket.id)
            .bind(ticket.booking_id)
            .bind(ticket.poi_id)
            .bind(&ticket.holder_name)
            .bind(&ticket.holder_email)
            .bind(&ticket.validation_code)
            .bind(&ticket.qr_payload)
            .bind(ticket.status.as_str())
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(tickets.to_vec())
    }

    async fn get_ticket(&self, id: Uuid) -> CoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn find_by_code(&self, validation_code: &str) -> CoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE validation_code = $1",
            TICKET_COLUMNS
        ))
        .bind(validation_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE booking_id = $1 ORDER BY created_at, id",
            TICKET_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn mark_used(
        &self,
        id: Uuid,
        device_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            UPDATE tickets SET status = 'USED', used_at = $2, validator_device_id = $3
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn void_for_booking(&self, booking_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'VOID' WHERE booking_id = $1 AND status = 'ACTIVE'",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
