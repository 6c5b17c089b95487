//! Capacity layout of a POI: per-timeslot or per-day.

use serde::{Deserialize, Serialize};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::Poi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    pub total: u32,
    pub available: u32,
}

impl Capacity {
    pub fn new(total: u32, used: u32) -> Self {
        Self {
            total,
            available: total.saturating_sub(used),
        }
    }

    /// Fraction of the capacity already taken, 0.0..=1.0
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            1.0 - (self.available as f64 / self.total as f64)
        }
    }
}

/// Total capacity for a lookup. `None` on a slotted POI sums every slot.
pub fn capacity_for(poi: &Poi, timeslot: Option<&str>) -> CoreResult<u32> {
    match timeslot {
        Some(label) => poi
            .timeslot(label)
            .map(|slot| slot.capacity)
            .ok_or_else(|| {
                CoreError::validation("timeslot", format!("timeslot '{}' is not offered by this POI", label))
            }),
        None => Ok(poi.day_capacity()),
    }
}

/// Booking rule: slotted POIs need a slot, unslotted POIs take none.
pub fn require_booking_slot(poi: &Poi, timeslot: Option<&str>) -> CoreResult<()> {
    match (poi.has_timeslots(), timeslot) {
        (true, None) => Err(CoreError::validation("timeslot", "timeslot is required for this POI")),
        (false, Some(_)) => Err(CoreError::validation("timeslot", "this POI does not sell timeslots")),
        (true, Some(label)) => capacity_for(poi, Some(label)).map(|_| ()),
        (false, None) => Ok(()),
    }
}
