//! Storage seams used by the workflow manager and the job scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

/// One attempt of one workflow execution. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub attempt: u32,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Bounded, expiring recent-history log per workflow id.
///
/// Implementations keep the newest `limit` records and drop records older
/// than their retention window.
#[async_trait]
pub trait ExecutionHistory: Send + Sync {
    async fn append(&self, record: &ExecutionRecord) -> CoreResult<()>;

    /// Newest first
    async fn recent(&self, workflow_id: &str, limit: usize) -> CoreResult<Vec<ExecutionRecord>>;
}

/// Single-owner leases keyed by name.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Returns `true` if `owner` now holds the lease.
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> CoreResult<bool>;

    /// Releases the lease only if `owner` still holds it.
    async fn release(&self, key: &str, owner: &str) -> CoreResult<()>;
}
