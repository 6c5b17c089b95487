use std::time::Duration;

use trailhead_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow already registered: {0}")]
    Duplicate(String),

    #[error("Scheduled job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Workflow {workflow_id} failed after {attempts} attempt(s): {source}")]
    Failed {
        workflow_id: String,
        attempts: u32,
        source: Box<WorkflowError>,
    },

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Handler(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Job queue {0} is closed")]
    QueueClosed(String),
}

impl WorkflowError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}
