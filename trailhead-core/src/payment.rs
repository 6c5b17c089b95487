use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Open,
    Authorised,
    Captured,
    Cancelled,
    Refunded,
    Failed,
}

/// What the booking flow asks the processor for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub amount: i64,
    pub currency: String,
    pub shopper_email: String,
    pub return_url: String,
}

/// A hosted checkout session at the payment processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub id: String, // Provider's session id
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub redirect_url: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub reference: String,
    pub status: PaymentStatus,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a hosted payment session with the provider
    async fn create_session(&self, request: &SessionRequest) -> CoreResult<PaymentSession>;

    /// Capture a previously authorised payment
    async fn capture(
        &self,
        transaction_id: &str,
        amount: i64,
        currency: &str,
    ) -> CoreResult<PaymentReceipt>;

    /// Cancel an authorisation that was never captured
    async fn cancel(&self, transaction_id: &str) -> CoreResult<PaymentReceipt>;

    /// Refund a captured payment
    async fn refund(
        &self,
        transaction_id: &str,
        amount: i64,
        currency: &str,
    ) -> CoreResult<PaymentReceipt>;
}
