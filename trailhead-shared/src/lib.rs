pub mod models;
pub mod pii;

pub use models::booking::{Booking, BookingStatus, GuestInfo};
pub use models::poi::{Poi, PoiTier, Timeslot};
pub use models::ticket::{Ticket, TicketStatus};
pub use pii::Masked;
