use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Active,
    Used,
    Void,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "ACTIVE",
            TicketStatus::Used => "USED",
            TicketStatus::Void => "VOID",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(TicketStatus::Active),
            "USED" => Ok(TicketStatus::Used),
            "VOID" => Ok(TicketStatus::Void),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// One admission. A confirmed booking carries one ticket per unit of quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub poi_id: Uuid,
    pub holder_name: String,
    pub holder_email: String,
    pub validation_code: String,
    pub qr_payload: String,
    pub status: TicketStatus,
    pub used_at: Option<DateTime<Utc>>,
    pub validator_device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        booking_id: Uuid,
        poi_id: Uuid,
        holder_name: String,
        holder_email: String,
        validation_code: String,
        qr_payload: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            poi_id,
            holder_name,
            holder_email,
            validation_code,
            qr_payload,
            status: TicketStatus::Active,
            used_at: None,
            validator_device_id: None,
            created_at: Utc::now(),
        }
    }

    /// Mark as used (scanned at the gate)
    pub fn consume(&mut self, device_id: Option<String>, at: DateTime<Utc>) {
        self.status = TicketStatus::Used;
        self.used_at = Some(at);
        self.validator_device_id = device_id;
    }
}
