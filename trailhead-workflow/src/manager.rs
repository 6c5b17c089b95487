//! Named-workflow registry with per-attempt timeout, exponential backoff
//! and a bounded execution history.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trailhead_core::coordination::{ExecutionHistory, ExecutionRecord, ExecutionStatus};

use crate::error::WorkflowError;
use crate::retry::RetryPolicy;

/// Handed to the workflow handler on every attempt.
///
/// `cancel` fires when the attempt times out; long-running handlers should
/// watch it and stop early.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub execution_id: Uuid,
    pub attempt: u32,
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn run(&self, ctx: WorkflowContext, data: Value) -> Result<Value, WorkflowError>;
}

#[async_trait]
impl<F, Fut> WorkflowHandler for F
where
    F: Fn(WorkflowContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
{
    async fn run(&self, ctx: WorkflowContext, data: Value) -> Result<Value, WorkflowError> {
        (self)(ctx, data).await
    }
}

pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub handler: Arc<dyn WorkflowHandler>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub enabled: bool,
}

impl WorkflowDefinition {
    pub fn new<H>(id: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: WorkflowHandler + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            handler: Arc::new(handler),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            enabled: true,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Default)]
struct Counters {
    executions: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStats {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub skipped: u64,
}

impl Counters {
    fn snapshot(&self) -> WorkflowStats {
        WorkflowStats {
            executions: self.executions.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

struct Registered {
    definition: WorkflowDefinition,
    counters: Counters,
}

/// Listing entry for admin tooling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub stats: WorkflowStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutcome {
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub attempts: u32,
    pub skipped: bool,
    pub output: Option<Value>,
}

/// Registry of workflows, built at start-up and shared as
/// `Arc<WorkflowManager>` afterwards.
pub struct WorkflowManager {
    workflows: HashMap<String, Registered>,
    history: Arc<dyn ExecutionHistory>,
}

impl WorkflowManager {
    pub fn new(history: Arc<dyn ExecutionHistory>) -> Self {
        Self {
            workflows: HashMap::new(),
            history,
        }
    }

    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<(), WorkflowError> {
        if self.workflows.contains_key(&definition.id) {
            return Err(WorkflowError::Duplicate(definition.id));
        }
        info!(
            workflow_id = %definition.id,
            max_retries = definition.retry.max_retries,
            timeout_ms = definition.timeout.as_millis() as u64,
            "Registered workflow"
        );
        self.workflows.insert(
            definition.id.clone(),
            Registered {
                definition,
                counters: Counters::default(),
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    /// Sorted by id
    pub fn definitions(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> = self
            .workflows
            .values()
            .map(|r| WorkflowSummary {
                id: r.definition.id.clone(),
                name: r.definition.name.clone(),
                enabled: r.definition.enabled,
                max_retries: r.definition.retry.max_retries,
                timeout_ms: r.definition.timeout.as_millis() as u64,
                stats: r.counters.snapshot(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn stats(&self, id: &str) -> Option<WorkflowStats> {
        self.workflows.get(id).map(|r| r.counters.snapshot())
    }

    /// Newest first
    pub async fn history(&self, id: &str, limit: usize) -> Result<Vec<ExecutionRecord>, WorkflowError> {
        if !self.contains(id) {
            return Err(WorkflowError::NotFound(id.to_string()));
        }
        Ok(self.history.recent(id, limit).await?)
    }

    /// Run a workflow, retrying failed or timed-out attempts per its policy.
    ///
    /// After the last allowed attempt fails, returns
    /// [`WorkflowError::Failed`] wrapping that attempt's error.
    pub async fn execute(&self, id: &str, data: Value) -> Result<WorkflowOutcome, WorkflowError> {
        let registered = self
            .workflows
            .get(id)
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        let definition = &registered.definition;
        let counters = &registered.counters;
        let execution_id = Uuid::new_v4();

        counters.executions.fetch_add(1, Ordering::Relaxed);

        if !definition.enabled {
            debug!(workflow_id = id, "Workflow disabled, skipping");
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            let now = Utc::now();
            self.record(ExecutionRecord {
                execution_id,
                workflow_id: id.to_string(),
                attempt: 0,
                status: ExecutionStatus::Skipped,
                started_at: now,
                finished_at: now,
                duration_ms: 0,
                error: None,
            })
            .await;
            return Ok(WorkflowOutcome {
                execution_id,
                workflow_id: id.to_string(),
                attempts: 0,
                skipped: true,
                output: None,
            });
        }

        let max_attempts = definition.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let ctx = WorkflowContext {
                workflow_id: id.to_string(),
                execution_id,
                attempt,
                cancel: CancellationToken::new(),
            };
            let cancel = ctx.cancel.clone();
            let started_at = Utc::now();
            let clock = Instant::now();

            // Timing out drops the handler future
            let result = match tokio::time::timeout(
                definition.timeout,
                definition.handler.run(ctx, data.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(WorkflowError::TimedOut(definition.timeout))
                }
            };

            let status = match &result {
                Ok(_) => ExecutionStatus::Succeeded,
                Err(WorkflowError::TimedOut(_)) => ExecutionStatus::TimedOut,
                Err(_) => ExecutionStatus::Failed,
            };
            self.record(ExecutionRecord {
                execution_id,
                workflow_id: id.to_string(),
                attempt,
                status,
                started_at,
                finished_at: Utc::now(),
                duration_ms: clock.elapsed().as_millis() as u64,
                error: result.as_ref().err().map(ToString::to_string),
            })
            .await;

            match result {
                Ok(output) => {
                    counters.successes.fetch_add(1, Ordering::Relaxed);
                    debug!(workflow_id = id, %execution_id, attempt, "Workflow succeeded");
                    return Ok(WorkflowOutcome {
                        execution_id,
                        workflow_id: id.to_string(),
                        attempts: attempt,
                        skipped: false,
                        output: Some(output),
                    });
                }
                Err(e) if attempt < max_attempts => {
                    counters.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = definition.retry.delay_for_attempt(attempt - 1);
                    warn!(
                        workflow_id = id,
                        %execution_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Workflow attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    error!(workflow_id = id, %execution_id, attempts = attempt, error = %e, "Workflow failed");
                    return Err(WorkflowError::Failed {
                        workflow_id: id.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    async fn record(&self, record: ExecutionRecord) {
        if let Err(e) = self.history.append(&record).await {
            warn!(workflow_id = %record.workflow_id, error = %e, "Failed to record workflow execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use trailhead_store::memory::MemoryExecutionHistory;

    fn manager() -> WorkflowManager {
        WorkflowManager::new(Arc::new(MemoryExecutionHistory::new(50, Duration::from_secs(3600))))
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
    }

    /// Fails until `succeed_on` (1-based), counting calls.
    fn flaky(calls: Arc<AtomicU32>, succeed_on: u32) -> impl WorkflowHandler {
        move |_: WorkflowContext, _: Value| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= succeed_on {
                    Ok(serde_json::json!({ "call": n }))
                } else {
                    Err(WorkflowError::handler(format!("attempt {} failed", n)))
                }
            }
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_last_allowed_attempt() {
        let mut manager = manager();
        let calls = Arc::new(AtomicU32::new(0));
        manager
            .register(WorkflowDefinition::new("sync", "Sync", flaky(calls.clone(), 4)).with_retry(fast_retry(3)))
            .unwrap();

        let outcome = manager.execute("sync", Value::Null).await.unwrap();

        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.output, Some(serde_json::json!({ "call": 4 })));

        let stats = manager.stats("sync").unwrap();
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.successes, 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_retry_ceiling() {
        let mut manager = manager();
        let calls = Arc::new(AtomicU32::new(0));
        manager
            .register(WorkflowDefinition::new("sync", "Sync", flaky(calls.clone(), 100)).with_retry(fast_retry(2)))
            .unwrap();

        let err = manager.execute("sync", Value::Null).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            WorkflowError::Failed { workflow_id, attempts, source } => {
                assert_eq!(workflow_id, "sync");
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "attempt 3 failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(manager.stats("sync").unwrap().failures, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_and_cancels_the_attempt() {
        let mut manager = manager();
        let cancelled = Arc::new(AtomicU32::new(0));
        let observed = cancelled.clone();

        let handler = move |ctx: WorkflowContext, _: Value| {
            let observed = observed.clone();
            async move {
                // Watch the token from a detached task so the signal is seen
                // even though this future gets dropped.
                let token = ctx.cancel.clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    observed.fetch_add(1, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Value::Null)
            }
        };
        manager
            .register(
                WorkflowDefinition::new("slow", "Slow", handler)
                    .with_retry(fast_retry(1))
                    .with_timeout(Duration::from_millis(20)),
            )
            .unwrap();

        let err = manager.execute("slow", Value::Null).await.unwrap_err();

        match err {
            WorkflowError::Failed { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, WorkflowError::TimedOut(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 2);

        let history = manager.history("slow", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.status == ExecutionStatus::TimedOut));
        assert_eq!(history[0].attempt, 2);
    }

    #[tokio::test]
    async fn test_disabled_workflow_is_skipped() {
        let mut manager = manager();
        let calls = Arc::new(AtomicU32::new(0));
        manager
            .register(WorkflowDefinition::new("off", "Off", flaky(calls.clone(), 1)).enabled(false))
            .unwrap();

        let outcome = manager.execute("off", Value::Null).await.unwrap();

        assert!(outcome.skipped);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let history = manager.history("off", 10).await.unwrap();
        assert_eq!(history[0].status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_ids() {
        let mut manager = manager();
        let calls = Arc::new(AtomicU32::new(0));
        manager
            .register(WorkflowDefinition::new("a", "A", flaky(calls.clone(), 1)))
            .unwrap();

        let dup = manager.register(WorkflowDefinition::new("a", "A again", flaky(calls, 1)));
        assert!(matches!(dup, Err(WorkflowError::Duplicate(id)) if id == "a"));

        assert!(matches!(
            manager.execute("missing", Value::Null).await,
            Err(WorkflowError::NotFound(_))
        ));
        assert_eq!(manager.definitions().len(), 1);
    }
}
