//! Payment Integration Bridge: session creation, capture, cancel and refund
//! through a [`PaymentAdapter`], plus normalisation of processor webhooks
//! into domain events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use trailhead_core::payment::{
    PaymentAdapter, PaymentReceipt, PaymentSession, PaymentStatus, SessionRequest,
};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::models::events::{
    PaymentCompletedEvent, PaymentFailedEvent, PaymentRefundedEvent, PAYMENT_COMPLETED,
    PAYMENT_FAILED, PAYMENT_REFUNDED,
};
use trailhead_shared::Booking;

use crate::resiliency::CircuitBreaker;

pub struct PaymentBridge {
    adapter: Arc<dyn PaymentAdapter>,
    breaker: CircuitBreaker,
    return_url: String,
}

impl PaymentBridge {
    pub fn new(adapter: Arc<dyn PaymentAdapter>, breaker: CircuitBreaker, return_url: String) -> Self {
        Self {
            adapter,
            breaker,
            return_url,
        }
    }

    /// Open a hosted checkout session for a pending booking
    pub async fn create_session(&self, booking: &Booking) -> CoreResult<PaymentSession> {
        let request = SessionRequest {
            booking_id: booking.id,
            booking_reference: booking.booking_reference.clone(),
            amount: booking.total_price,
            currency: booking.currency.clone(),
            shopper_email: booking.guest.email.expose().clone(),
            return_url: self.return_url.clone(),
        };
        let session = self.breaker.call(self.adapter.create_session(&request)).await?;
        debug!(booking_id = %booking.id, session_id = %session.id, "Payment session created");
        Ok(session)
    }

    pub async fn capture(&self, transaction_id: &str, amount: i64, currency: &str) -> CoreResult<PaymentReceipt> {
        let receipt = self
            .breaker
            .call(self.adapter.capture(transaction_id, amount, currency))
            .await?;
        debug!(transaction_id, amount, currency, "Payment captured");
        Ok(receipt)
    }

    /// Void an authorisation that was never captured.
    pub async fn cancel(&self, transaction_id: &str) -> CoreResult<PaymentReceipt> {
        let receipt = self.breaker.call(self.adapter.cancel(transaction_id)).await?;
        info!(transaction_id, reference = %receipt.reference, "Authorisation cancelled at processor");
        Ok(receipt)
    }

    pub async fn refund(&self, transaction_id: &str, amount: i64, currency: &str) -> CoreResult<PaymentReceipt> {
        let receipt = self
            .breaker
            .call(self.adapter.refund(transaction_id, amount, currency))
            .await?;
        info!(transaction_id, amount, currency, reference = %receipt.reference, "Refund requested at processor");
        Ok(receipt)
    }
}

/// Deterministic in-process processor for development and tests.
#[derive(Default)]
pub struct MockPaymentAdapter {
    failing: AtomicBool,
    captures: Mutex<Vec<String>>,
    cancels: Mutex<Vec<String>>,
    refunds: Mutex<Vec<String>>,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with an upstream error until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn captures(&self) -> Vec<String> {
        self.captures.lock().await.clone()
    }

    pub async fn cancels(&self) -> Vec<String> {
        self.cancels.lock().await.clone()
    }

    /// Transaction ids refunded so far, in call order.
    pub async fn refunds(&self) -> Vec<String> {
        self.refunds.lock().await.clone()
    }

    fn check(&self) -> CoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::UpstreamError("Simulated payment gateway failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_session(&self, request: &SessionRequest) -> CoreResult<PaymentSession> {
        self.check()?;
        // Encode booking id in the session id so webhooks can be faked from it
        let id = format!("mock_ps_{}", request.booking_id.simple());
        Ok(PaymentSession {
            redirect_url: format!("https://checkout.mock.local/sessions/{}", id),
            id,
            booking_id: request.booking_id,
            amount: request.amount,
            currency: request.currency.clone(),
            status: PaymentStatus::Open,
            created_at: Utc::now(),
        })
    }

    async fn capture(&self, transaction_id: &str, _amount: i64, _currency: &str) -> CoreResult<PaymentReceipt> {
        self.check()?;
        self.captures.lock().await.push(transaction_id.to_string());
        Ok(PaymentReceipt {
            transaction_id: transaction_id.to_string(),
            reference: format!("mock_capture_{}", transaction_id),
            status: PaymentStatus::Captured,
        })
    }

    async fn cancel(&self, transaction_id: &str) -> CoreResult<PaymentReceipt> {
        self.check()?;
        self.cancels.lock().await.push(transaction_id.to_string());
        Ok(PaymentReceipt {
            transaction_id: transaction_id.to_string(),
            reference: format!("mock_cancel_{}", transaction_id),
            status: PaymentStatus::Cancelled,
        })
    }

    async fn refund(&self, transaction_id: &str, _amount: i64, _currency: &str) -> CoreResult<PaymentReceipt> {
        self.check()?;
        self.refunds.lock().await.push(transaction_id.to_string());
        Ok(PaymentReceipt {
            transaction_id: transaction_id.to_string(),
            reference: format!("mock_refund_{}", transaction_id),
            status: PaymentStatus::Refunded,
        })
    }
}

/// JSON client for a hosted-checkout processor.
pub struct HttpPaymentAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModificationResponse {
    psp_reference: String,
    status: String,
}

impl HttpPaymentAdapter {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::internal)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: Value) -> CoreResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("payment processor unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%url, %status, "Payment processor rejected request");
            return Err(CoreError::UpstreamError(format!("payment processor returned {}: {}", status, text)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("unreadable payment processor response: {}", e)))
    }

    async fn modify(
        &self,
        transaction_id: &str,
        action: &str,
        body: Value,
        status: PaymentStatus,
    ) -> CoreResult<PaymentReceipt> {
        let response: ModificationResponse = self
            .post(&format!("/payments/{}/{}", transaction_id, action), body)
            .await?;
        debug!(transaction_id, action, processor_status = %response.status, "Payment modification accepted");
        Ok(PaymentReceipt {
            transaction_id: transaction_id.to_string(),
            reference: response.psp_reference,
            status,
        })
    }
}

#[async_trait]
impl PaymentAdapter for HttpPaymentAdapter {
    async fn create_session(&self, request: &SessionRequest) -> CoreResult<PaymentSession> {
        let response: SessionResponse = self
            .post(
                "/sessions",
                json!({
                    "amount": { "value": request.amount, "currency": request.currency },
                    "reference": request.booking_id,
                    "merchantOrderReference": request.booking_reference,
                    "shopperEmail": request.shopper_email,
                    "returnUrl": request.return_url,
                }),
            )
            .await?;

        Ok(PaymentSession {
            id: response.id,
            booking_id: request.booking_id,
            amount: request.amount,
            currency: request.currency.clone(),
            redirect_url: response.url,
            status: PaymentStatus::Open,
            created_at: Utc::now(),
        })
    }

    async fn capture(&self, transaction_id: &str, amount: i64, currency: &str) -> CoreResult<PaymentReceipt> {
        let body = json!({ "amount": { "value": amount, "currency": currency } });
        self.modify(transaction_id, "captures", body, PaymentStatus::Captured).await
    }

    async fn cancel(&self, transaction_id: &str) -> CoreResult<PaymentReceipt> {
        self.modify(transaction_id, "cancels", json!({}), PaymentStatus::Cancelled).await
    }

    async fn refund(&self, transaction_id: &str, amount: i64, currency: &str) -> CoreResult<PaymentReceipt> {
        let body = json!({ "amount": { "value": amount, "currency": currency } });
        self.modify(transaction_id, "refunds", body, PaymentStatus::Refunded).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAmount {
    pub value: i64,
    pub currency: String,
}

/// Webhook body sent by the processor.
///
/// `merchantReference` carries the booking id given at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    pub event_code: String,
    pub success: bool,
    pub psp_reference: String,
    pub merchant_reference: String,
    pub amount: Option<NotificationAmount>,
    pub reason: Option<String>,
}

/// Domain event derived from a processor notification.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    Completed(PaymentCompletedEvent),
    Failed(PaymentFailedEvent),
    Refunded(PaymentRefundedEvent),
}

impl PaymentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::Completed(_) => PAYMENT_COMPLETED,
            PaymentEvent::Failed(_) => PAYMENT_FAILED,
            PaymentEvent::Refunded(_) => PAYMENT_REFUNDED,
        }
    }

    pub fn payload(&self) -> CoreResult<Value> {
        match self {
            PaymentEvent::Completed(e) => serde_json::to_value(e),
            PaymentEvent::Failed(e) => serde_json::to_value(e),
            PaymentEvent::Refunded(e) => serde_json::to_value(e),
        }
        .map_err(CoreError::internal)
    }
}

impl PaymentNotification {
    /// Map to a domain event. Unknown event codes and unreadable references
    /// yield `None` and are acknowledged without further action.
    pub fn normalise(&self) -> Option<PaymentEvent> {
        let Ok(booking_id) = Uuid::parse_str(&self.merchant_reference) else {
            warn!(reference = %self.merchant_reference, "Webhook reference is not a booking id");
            return None;
        };
        let timestamp = Utc::now().timestamp();

        match (self.event_code.as_str(), self.success) {
            ("AUTHORISATION", true) => Some(PaymentEvent::Completed(PaymentCompletedEvent {
                booking_id,
                transaction_id: self.psp_reference.clone(),
                amount: self.amount.as_ref().map(|a| a.value),
                timestamp,
            })),
            ("AUTHORISATION", false) | ("CANCELLATION", _) => Some(PaymentEvent::Failed(PaymentFailedEvent {
                booking_id,
                transaction_id: Some(self.psp_reference.clone()),
                reason: self.reason.clone().or_else(|| Some(self.event_code.to_lowercase())),
                timestamp,
            })),
            ("REFUND", success) => Some(PaymentEvent::Refunded(PaymentRefundedEvent {
                booking_id,
                transaction_id: self.psp_reference.clone(),
                success,
                timestamp,
            })),
            (code, _) => {
                debug!(event_code = code, "Ignoring payment notification");
                None
            }
        }
    }
}
