use async_trait::async_trait;
use trailhead_shared::{Booking, Ticket};

use crate::CoreResult;

/// Outbound guest messaging (e-mail in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver tickets (QR payloads) to a recipient
    async fn send_tickets(
        &self,
        recipient: &str,
        booking: &Booking,
        tickets: &[Ticket],
    ) -> CoreResult<()>;

    /// Ask the guest to retry a failed payment
    async fn send_payment_retry(
        &self,
        recipient: &str,
        booking: &Booking,
        payment_url: &str,
    ) -> CoreResult<()>;
}
