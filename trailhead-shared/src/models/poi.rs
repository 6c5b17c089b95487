use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;
use std::str::FromStr;

use super::UnknownStatus;

/// Popularity tier, recomputed periodically from booking volume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoiTier {
    #[serde(rename = "TIER_1")]
    Tier1,
    #[serde(rename = "TIER_2")]
    Tier2,
    #[serde(rename = "TIER_3")]
    Tier3,
    #[serde(rename = "TIER_4")]
    Tier4,
}

impl PoiTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiTier::Tier1 => "TIER_1",
            PoiTier::Tier2 => "TIER_2",
            PoiTier::Tier3 => "TIER_3",
            PoiTier::Tier4 => "TIER_4",
        }
    }
}

impl fmt::Display for PoiTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoiTier {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TIER_1" => Ok(PoiTier::Tier1),
            "TIER_2" => Ok(PoiTier::Tier2),
            "TIER_3" => Ok(PoiTier::Tier3),
            "TIER_4" => Ok(PoiTier::Tier4),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timeslot {
    pub label: String,
    pub capacity: u32,
}

/// A bookable point of interest.
///
/// POIs with `timeslots` sell per slot; POIs without sell `daily_capacity`
/// per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poi {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub daily_capacity: u32,
    #[serde(default)]
    pub timeslots: Vec<Timeslot>,
    pub base_price: i64,
    pub currency: String,
    pub tier: PoiTier,
    pub is_active: bool,
}

impl Poi {
    pub fn has_timeslots(&self) -> bool {
        !self.timeslots.is_empty()
    }

    pub fn timeslot(&self, label: &str) -> Option<&Timeslot> {
        self.timeslots.iter().find(|slot| slot.label == label)
    }

    /// Capacity of a full day: the sum of all slots, or the daily capacity.
    pub fn day_capacity(&self) -> u32 {
        if self.has_timeslots() {
            self.timeslots.iter().map(|slot| slot.capacity).sum()
        } else {
            self.daily_capacity
        }
    }
}
