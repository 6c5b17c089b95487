use uuid::Uuid;

// Event names published on the in-process bus.
pub const BOOKING_CREATED: &str = "booking.created";
pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const BOOKING_CANCELLED: &str = "booking.cancelled";
pub const BOOKING_REFUND_REQUESTED: &str = "booking.refund_requested";
pub const PAYMENT_COMPLETED: &str = "payment.completed";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const PAYMENT_REFUNDED: &str = "payment.refunded";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub poi_id: Uuid,
    pub quantity: u32,
    pub total_price: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub payment_transaction_id: String,
    pub ticket_ids: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub previous_status: String,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequestedEvent {
    pub booking_id: Uuid,
    pub payment_transaction_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletedEvent {
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub amount: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedEvent {
    pub booking_id: Uuid,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRefundedEvent {
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub success: bool,
    pub timestamp: i64,
}
