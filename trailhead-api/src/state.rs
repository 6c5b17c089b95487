use std::sync::Arc;
use std::time::Duration;

use trailhead_booking::{
    BookingRules, BookingService, CircuitBreaker, HttpPaymentAdapter, MockPaymentAdapter, PaymentBridge,
    TicketService,
};
use trailhead_catalog::{AvailabilityEngine, PricingConfig, PricingEngine, TierReclassifier, TierThresholds};
use trailhead_core::notify::Notifier;
use trailhead_core::payment::PaymentAdapter;
use trailhead_core::repository::StoreHealth;
use trailhead_core::{CoreError, CoreResult};
use trailhead_store::app_config::{Config, PaymentConfig, PaymentProvider};
use trailhead_store::Stores;
use trailhead_workflow::{EventBus, Scheduler, WorkflowError, WorkflowManager};

use crate::workflows::{self, WorkflowServices};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub availability: Arc<AvailabilityEngine>,
    pub bookings: Arc<BookingService>,
    pub tickets: Arc<TicketService>,
    pub bus: Arc<EventBus>,
    pub workflows: Arc<WorkflowManager>,
    pub scheduler: Arc<Scheduler>,
    pub health: Arc<dyn StoreHealth>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
}

impl AppState {
    /// Wire services, workflows and event subscriptions over `stores`.
    pub async fn build(
        config: &Config,
        stores: Stores,
        payments: Arc<dyn PaymentAdapter>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, WorkflowError> {
        let bus = Arc::new(EventBus::new());

        let pricing = PricingEngine::new(PricingConfig {
            max_multiplier: config.pricing.max_multiplier,
            min_multiplier: config.pricing.min_multiplier,
            enable_demand: config.pricing.demand_pricing,
            ..PricingConfig::default()
        });
        let availability = Arc::new(AvailabilityEngine::new(
            stores.pois.clone(),
            stores.bookings.clone(),
            pricing,
            config.business_rules.max_range_days,
        ));

        let tickets = Arc::new(TicketService::new(
            stores.tickets.clone(),
            stores.bookings.clone(),
            stores.pois.clone(),
            notifier.clone(),
        ));

        let bridge = Arc::new(PaymentBridge::new(
            payments,
            CircuitBreaker::new(
                "payments",
                config.payment.circuit_failure_threshold,
                Duration::from_secs(config.payment.circuit_reset_seconds),
            ),
            config.payment.return_url.clone(),
        ));

        let bookings = Arc::new(BookingService::new(
            availability.clone(),
            stores.bookings.clone(),
            tickets.clone(),
            bridge,
            notifier,
            bus.clone(),
            BookingRules {
                max_quantity_per_booking: config.business_rules.max_quantity_per_booking,
                reference_prefix: config.business_rules.booking_reference_prefix.clone(),
            },
        ));

        let services = WorkflowServices {
            bookings: bookings.clone(),
            tickets: tickets.clone(),
            tiers: Arc::new(TierReclassifier::new(
                stores.pois.clone(),
                stores.bookings.clone(),
                TierThresholds::default(),
            )),
            pending_hold: Duration::from_secs(config.business_rules.pending_hold_seconds),
        };

        let mut manager = WorkflowManager::new(stores.history.clone());
        workflows::register_workflows(&mut manager, &services, &config.workflows)?;
        let manager = Arc::new(manager);

        workflows::wire_events(&bus, manager.clone(), &services, config.workflows.email_concurrency).await;
        let scheduler = workflows::build_scheduler(manager.clone(), stores.leases.clone(), &config.workflows)?;

        Ok(Self {
            availability,
            bookings,
            tickets,
            bus,
            workflows: manager,
            scheduler: Arc::new(scheduler),
            health: stores.health,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            webhook_secret: config.payment.webhook_secret.clone(),
        })
    }
}

/// Payment adapter selected by `payment.provider`.
pub fn payment_adapter(config: &PaymentConfig) -> CoreResult<Arc<dyn PaymentAdapter>> {
    match config.provider {
        PaymentProvider::Mock => Ok(Arc::new(MockPaymentAdapter::new())),
        PaymentProvider::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| CoreError::validation("payment.base_url", "required for the http provider"))?;
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| CoreError::validation("payment.api_key", "required for the http provider"))?;
            Ok(Arc::new(HttpPaymentAdapter::new(
                base_url,
                api_key,
                Duration::from_millis(config.request_timeout_ms),
            )?))
        }
    }
}
