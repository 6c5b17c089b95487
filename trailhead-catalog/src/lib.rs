pub mod availability;
pub mod inventory;
pub mod pricing;
pub mod tiers;

pub use availability::{Availability, AvailabilityEngine};
pub use inventory::Capacity;
pub use pricing::{Pricing, PricingConfig, PricingEngine};
pub use tiers::{TierReclassifier, TierReport, TierThresholds};
