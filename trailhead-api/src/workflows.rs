//! Business workflows, the events that trigger them and their schedules.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Utc, Weekday};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use trailhead_booking::{BookingService, Settlement, TicketService};
use trailhead_catalog::TierReclassifier;
use trailhead_core::coordination::LeaseStore;
use trailhead_shared::models::events::{
    BOOKING_CONFIRMED, BOOKING_REFUND_REQUESTED, PAYMENT_COMPLETED, PAYMENT_FAILED, PAYMENT_REFUNDED,
};
use trailhead_store::app_config::WorkflowConfig;
use trailhead_workflow::{
    EventBus, JobQueue, RetryPolicy, Schedule, ScheduledJob, Scheduler, WorkflowContext,
    WorkflowDefinition, WorkflowError, WorkflowManager,
};

pub const TICKET_DELIVERY: &str = "ticket-delivery";
pub const PAYMENT_RECOVERY: &str = "payment-recovery";
pub const REFUND_PROCESSING: &str = "refund-processing";
pub const BOOKING_CLEANUP: &str = "booking-cleanup";
pub const BOOKING_COMPLETION: &str = "booking-completion";
pub const TIER_RECLASSIFICATION: &str = "poi-tier-reclassification";

pub const EMAIL_QUEUE: &str = "ticket-email";

/// Services the workflows act on.
#[derive(Clone)]
pub struct WorkflowServices {
    pub bookings: Arc<BookingService>,
    pub tickets: Arc<TicketService>,
    pub tiers: Arc<TierReclassifier>,
    pub pending_hold: Duration,
}

fn booking_id(data: &Value) -> Result<Uuid, WorkflowError> {
    data.get("bookingId")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| WorkflowError::handler("payload has no valid bookingId"))
}

fn retry_policy(config: &WorkflowConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.default_max_retries,
        Duration::from_millis(config.default_base_delay_ms),
        Duration::from_millis(config.max_delay_ms),
    )
}

pub fn register_workflows(
    manager: &mut WorkflowManager,
    services: &WorkflowServices,
    config: &WorkflowConfig,
) -> Result<(), WorkflowError> {
    let timeout = Duration::from_millis(config.default_timeout_ms);
    let retry = retry_policy(config);

    let bookings = services.bookings.clone();
    manager.register(
        WorkflowDefinition::new(TICKET_DELIVERY, "Ticket delivery", move |ctx: WorkflowContext, data: Value| {
            let bookings = bookings.clone();
            async move {
                let id = booking_id(&data)?;
                let transaction_id = data
                    .get("transactionId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| WorkflowError::handler("payload has no transactionId"))?
                    .to_string();
                debug!(execution_id = %ctx.execution_id, attempt = ctx.attempt, booking_id = %id, "Settling payment");

                let output = match bookings.settle_payment(id, &transaction_id).await? {
                    Settlement::Confirmed(confirmed) => {
                        json!({ "bookingId": id, "tickets": confirmed.tickets.len() })
                    }
                    Settlement::Released { booking, receipt } => json!({
                        "bookingId": id,
                        "released": true,
                        "status": booking.status,
                        "reference": receipt.map(|r| r.reference),
                    }),
                };
                Ok::<Value, WorkflowError>(output)
            }
        })
        .with_retry(retry)
        .with_timeout(timeout),
    )?;

    let bookings = services.bookings.clone();
    manager.register(
        WorkflowDefinition::new(PAYMENT_RECOVERY, "Payment recovery", move |_: WorkflowContext, data: Value| {
            let bookings = bookings.clone();
            async move {
                let id = booking_id(&data)?;
                let payment_url = bookings.recover_payment(id).await?;
                Ok::<Value, WorkflowError>(json!({ "bookingId": id, "paymentUrl": payment_url }))
            }
        })
        .with_retry(retry)
        .with_timeout(timeout),
    )?;

    let bookings = services.bookings.clone();
    manager.register(
        WorkflowDefinition::new(REFUND_PROCESSING, "Refund processing", move |_: WorkflowContext, data: Value| {
            let bookings = bookings.clone();
            async move {
                let id = booking_id(&data)?;
                let receipt = bookings.process_refund(id).await?;
                Ok::<Value, WorkflowError>(json!({
                    "bookingId": id,
                    "refunded": receipt.is_some(),
                    "reference": receipt.map(|r| r.reference),
                }))
            }
        })
        .with_retry(retry)
        .with_timeout(timeout),
    )?;

    // Sweeps run again on the next tick, so no retries
    let bookings = services.bookings.clone();
    let hold = services.pending_hold;
    manager.register(
        WorkflowDefinition::new(BOOKING_CLEANUP, "Expire stale pending bookings", move |_: WorkflowContext, _: Value| {
            let bookings = bookings.clone();
            async move {
                let expired = bookings.expire_stale_pending(hold).await?;
                Ok::<Value, WorkflowError>(json!({ "expired": expired }))
            }
        })
        .with_retry(RetryPolicy::none())
        .with_timeout(timeout),
    )?;

    let bookings = services.bookings.clone();
    manager.register(
        WorkflowDefinition::new(BOOKING_COMPLETION, "Complete past bookings", move |_: WorkflowContext, _: Value| {
            let bookings = bookings.clone();
            async move {
                let completed = bookings.complete_past_bookings(Utc::now().date_naive()).await?;
                Ok::<Value, WorkflowError>(json!({ "completed": completed }))
            }
        })
        .with_retry(RetryPolicy::none())
        .with_timeout(timeout),
    )?;

    let tiers = services.tiers.clone();
    manager.register(
        WorkflowDefinition::new(TIER_RECLASSIFICATION, "POI tier reclassification", move |_: WorkflowContext, _: Value| {
            let tiers = tiers.clone();
            async move {
                let report = tiers.reclassify(Utc::now()).await?;
                serde_json::to_value(report).map_err(|e| WorkflowError::handler(e.to_string()))
            }
        })
        .with_retry(RetryPolicy::none())
        .with_timeout(timeout.max(Duration::from_secs(300))),
    )?;

    info!(count = manager.definitions().len(), "Workflows registered");
    Ok(())
}

/// Run `workflow_id` in the background whenever `event` is published.
async fn trigger_on(bus: &EventBus, event: &'static str, manager: Arc<WorkflowManager>, workflow_id: &'static str) {
    bus.subscribe(event, move |payload: Value| {
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.execute(workflow_id, payload).await {
                error!(event, workflow_id, error = %e, "Event-triggered workflow failed");
            }
        });
        async { Ok::<(), WorkflowError>(()) }
    })
    .await;
}

pub async fn wire_events(
    bus: &EventBus,
    manager: Arc<WorkflowManager>,
    services: &WorkflowServices,
    email_concurrency: usize,
) {
    trigger_on(bus, PAYMENT_COMPLETED, manager.clone(), TICKET_DELIVERY).await;
    trigger_on(bus, PAYMENT_FAILED, manager.clone(), PAYMENT_RECOVERY).await;
    trigger_on(bus, BOOKING_REFUND_REQUESTED, manager, REFUND_PROCESSING).await;

    bus.subscribe(PAYMENT_REFUNDED, |payload: Value| async move {
        info!(booking_id = ?payload.get("bookingId"), success = ?payload.get("success"), "Refund settled by processor");
        Ok::<(), WorkflowError>(())
    })
    .await;

    let bookings = services.bookings.clone();
    let tickets = services.tickets.clone();
    let (queue, _dispatcher) = JobQueue::start(EMAIL_QUEUE, email_concurrency, move |payload: Value| {
        let bookings = bookings.clone();
        let tickets = tickets.clone();
        async move {
            let booking = bookings.get_booking_by_id(booking_id(&payload)?).await?;
            let sent = tickets.deliver(&booking).await?;
            debug!(booking_id = %booking.id, sent, "Ticket e-mail delivered");
            Ok::<(), WorkflowError>(())
        }
    });

    bus.subscribe(BOOKING_CONFIRMED, move |payload: Value| {
        let queued = queue.enqueue(payload);
        async move { queued }
    })
    .await;
}

pub fn build_scheduler(
    manager: Arc<WorkflowManager>,
    leases: Arc<dyn LeaseStore>,
    config: &WorkflowConfig,
) -> Result<Scheduler, WorkflowError> {
    let mut scheduler = Scheduler::new(manager, leases, Duration::from_secs(config.lease_ttl_seconds));

    scheduler.add(ScheduledJob::new("booking-cleanup", BOOKING_CLEANUP, Schedule::every_minutes(5)?))?;
    scheduler.add(ScheduledJob::new("booking-completion", BOOKING_COMPLETION, Schedule::every_minutes(60)?))?;
    scheduler.add(ScheduledJob::new(
        "poi-tier-reclassification",
        TIER_RECLASSIFICATION,
        Schedule::weekly(Weekday::Mon, 3, 0)?,
    ))?;

    Ok(scheduler)
}
