use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use trailhead_core::notify::Notifier;
use trailhead_core::CoreResult;
use trailhead_shared::{Booking, Masked, Ticket};

/// Notifier that writes each message to the log instead of sending mail.
#[derive(Default)]
pub struct LoggingNotifier {
    tickets_sent: AtomicUsize,
    retries_sent: AtomicUsize,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tickets_sent(&self) -> usize {
        self.tickets_sent.load(Ordering::SeqCst)
    }

    pub fn retries_sent(&self) -> usize {
        self.retries_sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_tickets(&self, recipient: &str, booking: &Booking, tickets: &[Ticket]) -> CoreResult<()> {
        self.tickets_sent.fetch_add(1, Ordering::SeqCst);
        info!(
            recipient = %Masked::new(recipient),
            booking_reference = %booking.booking_reference,
            tickets = tickets.len(),
            "Ticket e-mail sent"
        );
        Ok(())
    }

    async fn send_payment_retry(&self, recipient: &str, booking: &Booking, payment_url: &str) -> CoreResult<()> {
        self.retries_sent.fetch_add(1, Ordering::SeqCst);
        info!(
            recipient = %Masked::new(recipient),
            booking_reference = %booking.booking_reference,
            payment_url,
            "Payment retry e-mail sent"
        );
        Ok(())
    }
}
