use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use trailhead_core::repository::{BookingRepository, PoiRepository};
use trailhead_core::CoreResult;
use trailhead_shared::PoiTier;

/// Minimum units sold in the window for tiers 1 to 3; anything below is tier 4.
#[derive(Debug, Clone)]
pub struct TierThresholds {
    pub window: Duration,
    pub tier1: u64,
    pub tier2: u64,
    pub tier3: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            window: Duration::days(30),
            tier1: 500,
            tier2: 100,
            tier3: 20,
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, sold: u64) -> PoiTier {
        if sold >= self.tier1 {
            PoiTier::Tier1
        } else if sold >= self.tier2 {
            PoiTier::Tier2
        } else if sold >= self.tier3 {
            PoiTier::Tier3
        } else {
            PoiTier::Tier4
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierReport {
    pub evaluated: usize,
    pub changed: usize,
}

/// Periodic re-tiering of POIs by recent sales volume.
pub struct TierReclassifier {
    pois: Arc<dyn PoiRepository>,
    bookings: Arc<dyn BookingRepository>,
    thresholds: TierThresholds,
}

impl TierReclassifier {
    pub fn new(
        pois: Arc<dyn PoiRepository>,
        bookings: Arc<dyn BookingRepository>,
        thresholds: TierThresholds,
    ) -> Self {
        Self {
            pois,
            bookings,
            thresholds,
        }
    }

    pub async fn reclassify(&self, now: DateTime<Utc>) -> CoreResult<TierReport> {
        let since = now - self.thresholds.window;
        let mut report = TierReport::default();

        for poi in self.pois.list_pois().await? {
            report.evaluated += 1;
            let sold = self.bookings.sold_quantity_since(poi.id, since).await?;
            let tier = self.thresholds.tier_for(sold);
            if tier != poi.tier {
                info!(poi_id = %poi.id, from = %poi.tier, to = %tier, sold, "Reclassifying POI");
                self.pois.set_tier(poi.id, tier).await?;
                report.changed += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use trailhead_core::repository::StatusUpdate;
    use trailhead_shared::{Booking, BookingStatus, GuestInfo, Masked, Poi};
    use trailhead_store::memory::{MemoryBookingRepository, MemoryPoiRepository};
    use uuid::Uuid;

    fn poi(tier: PoiTier) -> Poi {
        Poi {
            id: Uuid::new_v4(),
            name: "Museum".to_string(),
            slug: "museum".to_string(),
            daily_capacity: 1000,
            timeslots: vec![],
            base_price: 1500,
            currency: "EUR".to_string(),
            tier,
            is_active: true,
        }
    }

    #[test]
    fn test_tier_thresholds() {
        let thresholds = TierThresholds::default();
        assert_eq!(thresholds.tier_for(0), PoiTier::Tier4);
        assert_eq!(thresholds.tier_for(20), PoiTier::Tier3);
        assert_eq!(thresholds.tier_for(150), PoiTier::Tier2);
        assert_eq!(thresholds.tier_for(500), PoiTier::Tier1);
    }

    #[tokio::test]
    async fn test_reclassify_counts_confirmed_sales() {
        let busy = poi(PoiTier::Tier4);
        let quiet = poi(PoiTier::Tier4);
        let busy_id = busy.id;
        let pois = Arc::new(MemoryPoiRepository::with_pois(vec![busy, quiet]));
        let bookings = Arc::new(MemoryBookingRepository::new());

        let booking = Booking::new(
            "TH-TIER0001".to_string(),
            "user".to_string(),
            GuestInfo {
                name: "B".to_string(),
                email: Masked::new("b@example.com".to_string()),
                phone: None,
            },
            busy_id,
            NaiveDate::from_ymd_opt(2031, 1, 1).unwrap(),
            None,
            25,
            1500,
            "EUR".to_string(),
        );
        bookings.insert_if_capacity(&booking, 1000).await.unwrap();
        let mut update = StatusUpdate::to(BookingStatus::Confirmed);
        update.payment_transaction_id = Some("psp".to_string());
        bookings
            .transition(booking.id, BookingStatus::Pending, &update)
            .await
            .unwrap();

        let reclassifier = TierReclassifier::new(pois.clone(), bookings, TierThresholds::default());
        let report = reclassifier.reclassify(Utc::now()).await.unwrap();

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.changed, 1);
        let busy = pois.get_poi(busy_id).await.unwrap().unwrap();
        assert_eq!(busy.tier, PoiTier::Tier3);
    }
}
