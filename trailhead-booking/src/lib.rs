pub mod codes;
pub mod delivery;
pub mod payment;
pub mod resiliency;
pub mod service;
pub mod tickets;

pub use delivery::LoggingNotifier;
pub use payment::{HttpPaymentAdapter, MockPaymentAdapter, PaymentBridge, PaymentEvent, PaymentNotification};
pub use resiliency::{CircuitBreaker, CircuitState};
pub use service::{
    BookingQuery, BookingRules, BookingService, ConfirmedBooking, CreateBookingRequest, CreatedBooking,
    GuestInfoInput, Settlement,
};
pub use tickets::{InvalidReason, TicketService, TicketValidation, WalletPass};
