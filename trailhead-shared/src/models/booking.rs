use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;
use crate::pii::Masked;

/// Booking status in the lifecycle
///
/// `PENDING → CONFIRMED → COMPLETED`, with `PENDING → CANCELLED` and
/// `CONFIRMED → CANCELLED` as side transitions. Nothing leaves
/// `CANCELLED` or `COMPLETED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    /// Pending and confirmed bookings hold capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Contact details of the person the tickets are issued to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfo {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A reservation of `quantity` admissions to a POI on a date (and timeslot).
///
/// Prices are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub booking_reference: String,
    pub user_id: String,
    pub guest: GuestInfo,
    pub poi_id: Uuid,
    pub date: NaiveDate,
    pub timeslot: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_session_id: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        booking_reference: String,
        user_id: String,
        guest: GuestInfo,
        poi_id: Uuid,
        date: NaiveDate,
        timeslot: Option<String>,
        quantity: u32,
        unit_price: i64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_reference,
            user_id,
            guest,
            poi_id,
            date,
            timeslot,
            quantity,
            unit_price,
            total_price: unit_price * i64::from(quantity),
            currency,
            status: BookingStatus::Pending,
            payment_session_id: None,
            payment_transaction_id: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
        }
    }

    /// Apply a status change and stamp the matching timestamp.
    ///
    /// Callers check `can_transition_to` first; this only records.
    pub fn apply_status(
        &mut self,
        status: BookingStatus,
        payment_transaction_id: Option<String>,
        cancellation_reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.updated_at = at;
        match status {
            BookingStatus::Confirmed => {
                self.confirmed_at = Some(at);
                if payment_transaction_id.is_some() {
                    self.payment_transaction_id = payment_transaction_id;
                }
            }
            BookingStatus::Cancelled => {
                self.cancelled_at = Some(at);
                self.cancellation_reason = cancellation_reason;
            }
            BookingStatus::Completed => self.completed_at = Some(at),
            BookingStatus::Pending => {}
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest() -> GuestInfo {
        GuestInfo {
            name: "Ada".to_string(),
            email: Masked::new("ada@example.com".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_state_machine_edges() {
        use BookingStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));

        // No skipping, nothing out of terminal states
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Cancelled.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_new_booking_totals_and_status() {
        let date = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
        let booking = Booking::new(
            "TH-ABCDEFGH".to_string(),
            "user-1".to_string(),
            guest(),
            Uuid::new_v4(),
            date,
            Some("10:00".to_string()),
            3,
            1250,
            "EUR".to_string(),
        );

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_price, 3750);
        assert!(booking.confirmed_at.is_none());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!("confirmed".parse::<BookingStatus>().unwrap(), BookingStatus::Confirmed);
        assert_eq!(BookingStatus::Cancelled.to_string(), "CANCELLED");
        assert!("refunded".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let booking = Booking::new(
            "TH-ABCDEFGH".to_string(),
            "user-1".to_string(),
            guest(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            None,
            1,
            500,
            "EUR".to_string(),
        );
        let json = serde_json::to_value(&booking).unwrap();

        assert_eq!(json["bookingReference"], "TH-ABCDEFGH");
        assert_eq!(json["guest"]["email"], "ada@example.com");
        assert_eq!(json["status"], "PENDING");
    }
}
