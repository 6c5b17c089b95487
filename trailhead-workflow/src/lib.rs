//! Event-driven automation: in-process event bus, workflow manager with
//! timeout and backoff, cron-style job scheduler and a bounded job queue.

pub mod bus;
pub mod error;
pub mod manager;
pub mod queue;
pub mod retry;
pub mod schedule;
pub mod scheduler;

pub use bus::{EventBus, EventHandler, PublishReport};
pub use error::WorkflowError;
pub use manager::{
    WorkflowContext, WorkflowDefinition, WorkflowHandler, WorkflowManager, WorkflowOutcome,
    WorkflowSummary,
};
pub use queue::{JobHandler, JobQueue};
pub use retry::RetryPolicy;
pub use schedule::Schedule;
pub use scheduler::{JobRun, ScheduledJob, Scheduler};
