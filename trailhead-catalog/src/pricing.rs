use serde::{Deserialize, Serialize};

/// Unit price for one admission after demand adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub unit_price: i64,
    pub currency: String,
    pub demand_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Prices are rounded to a multiple of this many minor units
    pub min_adjustment_cents: i64,

    /// Maximum multiplier allowed
    pub max_multiplier: f64,

    /// Minimum multiplier allowed
    pub min_multiplier: f64,

    /// When off, every quote is the POI base price
    pub enable_demand: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            min_adjustment_cents: 1,
            max_multiplier: 1.5,
            min_multiplier: 1.0,
            enable_demand: true,
        }
    }
}

/// Demand-based pricing engine
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Price adjustment based on how much of the capacity is already taken
    pub fn calculate_demand_multiplier(&self, available: u32, total_capacity: u32) -> f64 {
        if total_capacity == 0 || !self.config.enable_demand {
            return 1.0;
        }

        let utilization = 1.0 - (available.min(total_capacity) as f64 / total_capacity as f64);

        // Exponential curve: as utilization increases, price increases
        let multiplier = 1.0 + (utilization * utilization * 2.0);

        // Clamp to configured limits
        multiplier.max(self.config.min_multiplier).min(self.config.max_multiplier)
    }

    /// Apply a multiplier to a base price (minor units)
    pub fn apply_multiplier(&self, base_price: i64, multiplier: f64) -> i64 {
        let adjusted = (base_price as f64 * multiplier).round() as i64;
        let step = self.config.min_adjustment_cents.max(1);

        // Round to nearest step
        let remainder = adjusted % step;
        if remainder * 2 >= step {
            adjusted + (step - remainder)
        } else {
            adjusted - remainder
        }
    }

    pub fn quote(&self, base_price: i64, currency: &str, available: u32, total_capacity: u32) -> Pricing {
        let demand_multiplier = self.calculate_demand_multiplier(available, total_capacity);
        Pricing {
            unit_price: self.apply_multiplier(base_price, demand_multiplier),
            currency: currency.to_string(),
            demand_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PricingEngine {
        PricingEngine::new(PricingConfig {
            max_multiplier: 3.0,
            min_multiplier: 0.5,
            ..PricingConfig::default()
        })
    }

    #[test]
    fn test_demand_multiplier() {
        let engine = engine();

        // Low demand (90% available)
        let multiplier = engine.calculate_demand_multiplier(90, 100);
        assert!(multiplier < 1.1);

        // High demand (10% available)
        let multiplier = engine.calculate_demand_multiplier(10, 100);
        assert!(multiplier > 2.0);
    }

    #[test]
    fn test_multiplier_is_clamped() {
        let engine = PricingEngine::new(PricingConfig::default());
        assert_eq!(engine.calculate_demand_multiplier(0, 10), 1.5);
        assert_eq!(engine.calculate_demand_multiplier(10, 10), 1.0);
        assert_eq!(engine.calculate_demand_multiplier(0, 0), 1.0);
    }

    #[test]
    fn test_demand_pricing_disabled() {
        let engine = PricingEngine::new(PricingConfig {
            enable_demand: false,
            ..PricingConfig::default()
        });
        let quote = engine.quote(2500, "EUR", 0, 10);
        assert_eq!(quote.unit_price, 2500);
        assert_eq!(quote.demand_multiplier, 1.0);
    }

    #[test]
    fn test_apply_multiplier_rounds_to_step() {
        let engine = PricingEngine::new(PricingConfig {
            min_adjustment_cents: 50,
            ..PricingConfig::default()
        });
        assert_eq!(engine.apply_multiplier(1000, 1.234), 1250);
        assert_eq!(engine.apply_multiplier(1000, 1.2), 1200);
    }
}
