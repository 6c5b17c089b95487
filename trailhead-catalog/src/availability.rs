use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use trailhead_core::repository::{BookingRepository, PoiRepository};
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::Poi;

use crate::inventory::{capacity_for, Capacity};
use crate::pricing::{Pricing, PricingEngine};

/// Remaining capacity and current price for one POI/date/timeslot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub poi_id: Uuid,
    pub date: NaiveDate,
    pub timeslot: Option<String>,
    pub available: bool,
    pub capacity: Capacity,
    pub pricing: Pricing,
}

pub struct AvailabilityEngine {
    pois: Arc<dyn PoiRepository>,
    bookings: Arc<dyn BookingRepository>,
    pricing: PricingEngine,
    max_range_days: u32,
}

impl AvailabilityEngine {
    pub fn new(
        pois: Arc<dyn PoiRepository>,
        bookings: Arc<dyn BookingRepository>,
        pricing: PricingEngine,
        max_range_days: u32,
    ) -> Self {
        Self {
            pois,
            bookings,
            pricing,
            max_range_days: max_range_days.max(1),
        }
    }

    /// Inactive POIs are treated as unknown.
    pub async fn active_poi(&self, poi_id: Uuid) -> CoreResult<Poi> {
        match self.pois.get_poi(poi_id).await? {
            Some(poi) if poi.is_active => Ok(poi),
            _ => Err(CoreError::not_found("POI", poi_id)),
        }
    }

    pub async fn check(
        &self,
        poi_id: Uuid,
        date: NaiveDate,
        timeslot: Option<&str>,
    ) -> CoreResult<Availability> {
        let poi = self.active_poi(poi_id).await?;
        self.check_poi(&poi, date, timeslot).await
    }

    /// Same as [`check`](Self::check) for an already loaded POI.
    pub async fn check_poi(
        &self,
        poi: &Poi,
        date: NaiveDate,
        timeslot: Option<&str>,
    ) -> CoreResult<Availability> {
        let total = capacity_for(poi, timeslot)?;
        let used = self.bookings.active_quantity(poi.id, date, timeslot).await?;
        let capacity = Capacity::new(total, used);
        let pricing = self
            .pricing
            .quote(poi.base_price, &poi.currency, capacity.available, capacity.total);

        debug!(poi_id = %poi.id, %date, ?timeslot, total, used, "Availability computed");

        Ok(Availability {
            poi_id: poi.id,
            date,
            timeslot: timeslot.map(str::to_string),
            available: capacity.available > 0,
            capacity,
            pricing,
        })
    }

    /// One record per day from `from` to `to`, both inclusive.
    pub async fn check_range(
        &self,
        poi_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        timeslot: Option<&str>,
    ) -> CoreResult<Vec<Availability>> {
        if from > to {
            return Err(CoreError::validation("from", "from must not be after to"));
        }
        let days = (to - from).num_days() + 1;
        if days > i64::from(self.max_range_days) {
            return Err(CoreError::validation(
                "to",
                format!("range exceeds {} days", self.max_range_days),
            ));
        }

        let poi = self.active_poi(poi_id).await?;
        let mut records = Vec::with_capacity(days as usize);
        for date in from.iter_days().take(days as usize) {
            records.push(self.check_poi(&poi, date, timeslot).await?);
        }
        Ok(records)
    }
}
