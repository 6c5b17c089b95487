//! Cron-style triggers dispatching into the [`WorkflowManager`].
//!
//! Every run first takes the lease `lease:<job>` so overlapping runs of the
//! same job, from this process or another instance, are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trailhead_core::coordination::LeaseStore;

use crate::error::WorkflowError;
use crate::manager::{WorkflowManager, WorkflowOutcome};
use crate::schedule::Schedule;

#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub name: String,
    pub workflow_id: String,
    pub schedule: Schedule,
}

impl ScheduledJob {
    pub fn new(name: impl Into<String>, workflow_id: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            name: name.into(),
            workflow_id: workflow_id.into(),
            schedule,
        }
    }
}

/// Result of one job run.
#[derive(Debug, Clone)]
pub enum JobRun {
    Completed(WorkflowOutcome),
    /// Another owner holds the lease; nothing ran.
    LeaseHeld,
}

pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    manager: Arc<WorkflowManager>,
    leases: Arc<dyn LeaseStore>,
    owner: String,
    lease_ttl: Duration,
}

fn lease_key(job: &str) -> String {
    format!("lease:{}", job)
}

impl Scheduler {
    pub fn new(manager: Arc<WorkflowManager>, leases: Arc<dyn LeaseStore>, lease_ttl: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            manager,
            leases,
            owner: format!("scheduler-{}", Uuid::new_v4()),
            lease_ttl,
        }
    }

    pub fn add(&mut self, job: ScheduledJob) -> Result<(), WorkflowError> {
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(WorkflowError::Duplicate(job.name));
        }
        if !self.manager.contains(&job.workflow_id) {
            return Err(WorkflowError::NotFound(job.workflow_id));
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Spawn one loop per job. Loops exit when `cancel` fires.
    pub fn run(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .cloned()
            .map(|job| {
                let scheduler = Arc::clone(self);
                let cancel = cancel.clone();
                tokio::spawn(async move { scheduler.job_loop(job, cancel).await })
            })
            .collect()
    }

    async fn job_loop(&self, job: ScheduledJob, cancel: CancellationToken) {
        info!(job = %job.name, workflow_id = %job.workflow_id, "Scheduler loop started");

        loop {
            let now = Utc::now();
            let Some(next) = job.schedule.next_after(now) else {
                error!(job = %job.name, "Schedule has no next fire time, stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(job = %job.name, next = %next, "Next run scheduled");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(job = %job.name, "Scheduler loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(wait) => {
                    match self.run_job(&job, true).await {
                        Ok(JobRun::Completed(outcome)) => {
                            info!(job = %job.name, attempts = outcome.attempts, skipped = outcome.skipped, "Scheduled run finished");
                        }
                        Ok(JobRun::LeaseHeld) => {}
                        Err(e) => error!(job = %job.name, error = %e, "Scheduled run failed"),
                    }
                }
            }
        }
    }

    /// Run `job_name` now, outside its schedule.
    pub async fn trigger(&self, job_name: &str) -> Result<JobRun, WorkflowError> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.name == job_name)
            .ok_or_else(|| WorkflowError::JobNotFound(job_name.to_string()))?;
        self.run_job(job, false).await
    }

    async fn run_job(&self, job: &ScheduledJob, scheduled: bool) -> Result<JobRun, WorkflowError> {
        let key = lease_key(&job.name);
        if !self.leases.try_acquire(&key, &self.owner, self.lease_ttl).await? {
            info!(job = %job.name, "Previous run still holds the lease, skipping");
            return Ok(JobRun::LeaseHeld);
        }

        let result = self
            .manager
            .execute(&job.workflow_id, json!({ "scheduled": scheduled, "job": job.name }))
            .await;

        if let Err(e) = self.leases.release(&key, &self.owner).await {
            warn!(job = %job.name, error = %e, "Failed to release scheduler lease");
        }

        result.map(JobRun::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{WorkflowContext, WorkflowDefinition};
    use crate::retry::RetryPolicy;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use trailhead_store::memory::{MemoryExecutionHistory, MemoryLeaseStore};

    fn setup(calls: Arc<AtomicU32>) -> (Arc<WorkflowManager>, Arc<MemoryLeaseStore>) {
        let mut manager =
            WorkflowManager::new(Arc::new(MemoryExecutionHistory::new(10, Duration::from_secs(60))));
        manager
            .register(
                WorkflowDefinition::new("booking-cleanup", "Cleanup", move |_: WorkflowContext, data: Value| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(data)
                    }
                })
                .with_retry(RetryPolicy::none()),
            )
            .unwrap();
        (Arc::new(manager), Arc::new(MemoryLeaseStore::new()))
    }

    #[tokio::test]
    async fn test_trigger_runs_workflow() {
        let calls = Arc::new(AtomicU32::new(0));
        let (manager, leases) = setup(calls.clone());
        let mut scheduler = Scheduler::new(manager, leases, Duration::from_secs(30));
        scheduler
            .add(ScheduledJob::new("cleanup", "booking-cleanup", Schedule::every_minutes(5).unwrap()))
            .unwrap();

        let run = scheduler.trigger("cleanup").await.unwrap();

        match run {
            JobRun::Completed(outcome) => {
                assert_eq!(outcome.output, Some(json!({ "scheduled": false, "job": "cleanup" })));
            }
            JobRun::LeaseHeld => panic!("lease should be free"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            scheduler.trigger("missing").await,
            Err(WorkflowError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_skips_when_lease_held_elsewhere() {
        let calls = Arc::new(AtomicU32::new(0));
        let (manager, leases) = setup(calls.clone());
        let mut scheduler = Scheduler::new(manager, leases.clone(), Duration::from_secs(30));
        scheduler
            .add(ScheduledJob::new("cleanup", "booking-cleanup", Schedule::every_minutes(5).unwrap()))
            .unwrap();

        assert!(leases
            .try_acquire("lease:cleanup", "other-instance", Duration::from_secs(30))
            .await
            .unwrap());

        let run = scheduler.trigger("cleanup").await.unwrap();
        assert!(matches!(run, JobRun::LeaseHeld));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loop_fires_and_stops_on_cancel() {
        let calls = Arc::new(AtomicU32::new(0));
        let (manager, leases) = setup(calls.clone());
        let mut scheduler = Scheduler::new(manager, leases, Duration::from_secs(30));
        scheduler
            .add(ScheduledJob::new(
                "cleanup",
                "booking-cleanup",
                Schedule::every(Duration::from_millis(10)).unwrap(),
            ))
            .unwrap();
        let scheduler = Arc::new(scheduler);

        let cancel = CancellationToken::new();
        let handles = scheduler.run(cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_rejects_unknown_workflow_and_duplicate_job() {
        let (manager, leases) = setup(Arc::new(AtomicU32::new(0)));
        let mut scheduler = Scheduler::new(manager, leases, Duration::from_secs(30));
        let every = Schedule::every_minutes(1).unwrap();

        assert!(scheduler.add(ScheduledJob::new("a", "nope", every)).is_err());
        scheduler.add(ScheduledJob::new("a", "booking-cleanup", every)).unwrap();
        assert!(matches!(
            scheduler.add(ScheduledJob::new("a", "booking-cleanup", every)),
            Err(WorkflowError::Duplicate(_))
        ));
    }
}
