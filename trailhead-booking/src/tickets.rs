//! Ticket minting, single-use validation, resend and wallet passes.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use trailhead_core::notify::Notifier;
use trailhead_core::repository::{BookingRepository, PoiRepository, TicketRepository};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::{Booking, Ticket, TicketStatus};

use crate::codes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    WrongPoi,
    Void,
    AlreadyUsed,
}

/// Gate scan result. Invalid scans are results, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

impl TicketValidation {
    fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            ticket: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBarcode {
    pub message: String,
    pub format: String,
    pub message_encoding: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPass {
    pub serial_number: String,
    pub description: String,
    pub organization_name: String,
    pub barcode: WalletBarcode,
    pub relevant_date: String,
    pub poi_name: String,
    pub holder_name: String,
    pub booking_reference: String,
    pub timeslot: Option<String>,
}

const ORGANIZATION_NAME: &str = "Trailhead";

pub struct TicketService {
    tickets: Arc<dyn TicketRepository>,
    bookings: Arc<dyn BookingRepository>,
    pois: Arc<dyn PoiRepository>,
    notifier: Arc<dyn Notifier>,
}

impl TicketService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        bookings: Arc<dyn BookingRepository>,
        pois: Arc<dyn PoiRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            tickets,
            bookings,
            pois,
            notifier,
        }
    }

    /// One ticket per unit. Returns the existing tickets if already issued.
    pub async fn issue_for_booking(&self, booking: &Booking) -> CoreResult<Vec<Ticket>> {
        let minted: Vec<Ticket> = (0..booking.quantity)
            .map(|_| {
                let code = codes::validation_code();
                let qr_payload = Self::qr_payload(&code, booking);
                Ticket::new(
                    booking.id,
                    booking.poi_id,
                    booking.guest.name.clone(),
                    booking.guest.email.expose().clone(),
                    code,
                    qr_payload,
                )
            })
            .collect();

        let stored = self
            .tickets
            .insert_for_booking_if_absent(booking.id, &minted)
            .await?;
        let issued = stored.iter().zip(&minted).all(|(s, m)| s.id == m.id);
        if issued {
            info!(booking_id = %booking.id, count = stored.len(), "Tickets issued");
        } else {
            debug!(booking_id = %booking.id, count = stored.len(), "Tickets already issued");
        }
        Ok(stored)
    }

    fn qr_payload(code: &str, booking: &Booking) -> String {
        json!({
            "code": code,
            "bookingReference": booking.booking_reference,
            "poiId": booking.poi_id,
            "date": booking.date,
            "timeslot": booking.timeslot,
        })
        .to_string()
    }

    /// Accepts either the raw validation code or the full QR payload.
    fn extract_code(scanned: &str) -> String {
        let scanned = scanned.trim();
        if scanned.starts_with('{') {
            let code = serde_json::from_str::<serde_json::Value>(scanned)
                .ok()
                .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_string));
            if let Some(code) = code {
                return code;
            }
        }
        scanned.to_string()
    }

    pub async fn validate(
        &self,
        scanned: &str,
        poi_id: Uuid,
        device_id: Option<&str>,
    ) -> CoreResult<TicketValidation> {
        let code = Self::extract_code(scanned);
        let Some(ticket) = self.tickets.find_by_code(&code).await? else {
            return Ok(TicketValidation::invalid(InvalidReason::NotFound));
        };

        if ticket.poi_id != poi_id {
            return Ok(TicketValidation::invalid(InvalidReason::WrongPoi));
        }
        match ticket.status {
            TicketStatus::Void => return Ok(TicketValidation::invalid(InvalidReason::Void)),
            TicketStatus::Used => return Ok(TicketValidation::invalid(InvalidReason::AlreadyUsed)),
            TicketStatus::Active => {}
        }

        match self.tickets.mark_used(ticket.id, device_id, Utc::now()).await? {
            Some(used) => {
                info!(ticket_id = %used.id, ?device_id, "Ticket validated");
                Ok(TicketValidation {
                    valid: true,
                    reason: None,
                    ticket: Some(used),
                })
            }
            // Lost a race with another scan or a cancellation
            None => {
                let current = self.tickets.get_ticket(ticket.id).await?;
                let reason = match current.map(|t| t.status) {
                    Some(TicketStatus::Void) => InvalidReason::Void,
                    _ => InvalidReason::AlreadyUsed,
                };
                Ok(TicketValidation::invalid(reason))
            }
        }
    }

    pub async fn get_ticket(&self, id: Uuid) -> CoreResult<Ticket> {
        self.tickets
            .get_ticket(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Ticket", id))
    }

    pub async fn tickets_for_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        self.tickets.list_for_booking(booking_id).await
    }

    async fn booking_for(&self, ticket: &Ticket) -> CoreResult<Booking> {
        self.bookings
            .get_booking(ticket.booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Booking", ticket.booking_id))
    }

    /// Send the ticket again; returns the recipient used.
    pub async fn resend(&self, ticket_id: Uuid, email: Option<&str>) -> CoreResult<String> {
        let ticket = self.get_ticket(ticket_id).await?;
        if ticket.status == TicketStatus::Void {
            return Err(CoreError::transition(ticket.status, "RESENT"));
        }
        if let Some(email) = email {
            if !email.contains('@') {
                return Err(CoreError::validation("email", "must be a valid e-mail address"));
            }
        }

        let booking = self.booking_for(&ticket).await?;
        let recipient = email.unwrap_or(&ticket.holder_email).to_string();
        self.notifier
            .send_tickets(&recipient, &booking, std::slice::from_ref(&ticket))
            .await?;
        Ok(recipient)
    }

    pub async fn wallet_pass(&self, ticket_id: Uuid) -> CoreResult<WalletPass> {
        let ticket = self.get_ticket(ticket_id).await?;
        if ticket.status == TicketStatus::Void {
            return Err(CoreError::transition(ticket.status, "WALLET_PASS"));
        }

        let booking = self.booking_for(&ticket).await?;
        let poi_name = self
            .pois
            .get_poi(ticket.poi_id)
            .await?
            .map(|p| p.name)
            .unwrap_or_else(|| ORGANIZATION_NAME.to_string());

        Ok(WalletPass {
            serial_number: ticket.id.to_string(),
            description: format!("Admission to {}", poi_name),
            organization_name: ORGANIZATION_NAME.to_string(),
            barcode: WalletBarcode {
                message: ticket.qr_payload.clone(),
                format: "PKBarcodeFormatQR".to_string(),
                message_encoding: "iso-8859-1".to_string(),
            },
            relevant_date: booking.date.to_string(),
            poi_name,
            holder_name: ticket.holder_name,
            booking_reference: booking.booking_reference,
            timeslot: booking.timeslot,
        })
    }

    pub async fn void_for_booking(&self, booking_id: Uuid) -> CoreResult<u64> {
        let voided = self.tickets.void_for_booking(booking_id).await?;
        if voided > 0 {
            info!(%booking_id, voided, "Tickets voided");
        }
        Ok(voided)
    }

    /// E-mail every ticket of a booking to its guest.
    pub async fn deliver(&self, booking: &Booking) -> CoreResult<usize> {
        let tickets = self.tickets.list_for_booking(booking.id).await?;
        let active: Vec<Ticket> = tickets
            .into_iter()
            .filter(|t| t.status == TicketStatus::Active)
            .collect();
        if active.is_empty() {
            return Ok(0);
        }
        self.notifier
            .send_tickets(booking.guest.email.expose(), booking, &active)
            .await?;
        Ok(active.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::LoggingNotifier;
    use chrono::NaiveDate;
    use trailhead_shared::{GuestInfo, Masked, Poi, PoiTier};
    use trailhead_store::memory::{MemoryBookingRepository, MemoryPoiRepository, MemoryTicketRepository};

    struct Fixture {
        service: TicketService,
        notifier: Arc<LoggingNotifier>,
        booking: Booking,
    }

    async fn fixture(quantity: u32) -> Fixture {
        let poi = Poi {
            id: Uuid::new_v4(),
            name: "Lighthouse".to_string(),
            slug: "lighthouse".to_string(),
            daily_capacity: 20,
            timeslots: vec![],
            base_price: 900,
            currency: "EUR".to_string(),
            tier: PoiTier::Tier3,
            is_active: true,
        };
        let booking = Booking::new(
            "TH-TICKET01".to_string(),
            "user".to_string(),
            GuestInfo {
                name: "Sam".to_string(),
                email: Masked::new("sam@example.com".to_string()),
                phone: None,
            },
            poi.id,
            NaiveDate::from_ymd_opt(2031, 7, 1).unwrap(),
            None,
            quantity,
            900,
            "EUR".to_string(),
        );
        let bookings = Arc::new(MemoryBookingRepository::new());
        bookings.insert_if_capacity(&booking, 20).await.unwrap();
        let notifier = Arc::new(LoggingNotifier::new());

        Fixture {
            service: TicketService::new(
                Arc::new(MemoryTicketRepository::new()),
                bookings,
                Arc::new(MemoryPoiRepository::with_pois(vec![poi])),
                notifier.clone(),
            ),
            notifier,
            booking,
        }
    }

    #[tokio::test]
    async fn test_issue_is_idempotent() {
        let f = fixture(3).await;

        let first = f.service.issue_for_booking(&f.booking).await.unwrap();
        let second = f.service.issue_for_booking(&f.booking).await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        let mut a: Vec<Uuid> = first.iter().map(|t| t.id).collect();
        let mut b: Vec<Uuid> = second.iter().map(|t| t.id).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert!(first.iter().all(|t| t.validation_code.starts_with("TKT-")));
    }

    #[tokio::test]
    async fn test_validation_is_single_use() {
        let f = fixture(1).await;
        let ticket = f.service.issue_for_booking(&f.booking).await.unwrap().remove(0);

        let first = f
            .service
            .validate(&ticket.validation_code, f.booking.poi_id, Some("gate-1"))
            .await
            .unwrap();
        let second = f
            .service
            .validate(&ticket.validation_code, f.booking.poi_id, Some("gate-2"))
            .await
            .unwrap();

        assert!(first.valid);
        assert_eq!(first.ticket.unwrap().validator_device_id.as_deref(), Some("gate-1"));
        assert!(!second.valid);
        assert_eq!(second.reason, Some(InvalidReason::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_validate_accepts_qr_payload_and_checks_poi() {
        let f = fixture(1).await;
        let ticket = f.service.issue_for_booking(&f.booking).await.unwrap().remove(0);

        let wrong = f.service.validate(&ticket.qr_payload, Uuid::new_v4(), None).await.unwrap();
        assert_eq!(wrong.reason, Some(InvalidReason::WrongPoi));

        let ok = f.service.validate(&ticket.qr_payload, f.booking.poi_id, None).await.unwrap();
        assert!(ok.valid);

        let unknown = f.service.validate("TKT-NOPE", f.booking.poi_id, None).await.unwrap();
        assert_eq!(unknown.reason, Some(InvalidReason::NotFound));
    }

    #[tokio::test]
    async fn test_void_tickets_fail_validation_and_resend() {
        let f = fixture(2).await;
        let tickets = f.service.issue_for_booking(&f.booking).await.unwrap();

        assert_eq!(f.service.void_for_booking(f.booking.id).await.unwrap(), 2);

        let result = f
            .service
            .validate(&tickets[0].validation_code, f.booking.poi_id, None)
            .await
            .unwrap();
        assert_eq!(result.reason, Some(InvalidReason::Void));
        assert!(matches!(
            f.service.resend(tickets[0].id, None).await,
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(f.service.wallet_pass(tickets[0].id).await.is_err());
    }

    #[tokio::test]
    async fn test_resend_and_wallet_pass() {
        let f = fixture(1).await;
        let ticket = f.service.issue_for_booking(&f.booking).await.unwrap().remove(0);

        let recipient = f.service.resend(ticket.id, Some("other@example.com")).await.unwrap();
        assert_eq!(recipient, "other@example.com");
        assert_eq!(f.notifier.tickets_sent(), 1);

        let pass = f.service.wallet_pass(ticket.id).await.unwrap();
        assert_eq!(pass.poi_name, "Lighthouse");
        assert_eq!(pass.barcode.message, ticket.qr_payload);
        assert_eq!(pass.relevant_date, "2031-07-01");
    }
}
