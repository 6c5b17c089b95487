use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use trailhead_core::coordination::ExecutionRecord;
use trailhead_core::CoreError;
use trailhead_workflow::{JobRun, WorkflowOutcome, WorkflowSummary};

use crate::error::{ok, ApiResponse, AppResult};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/workflows", get(list_workflows))
        .route("/admin/workflows/{workflow_id}/history", get(workflow_history))
        .route("/admin/workflows/{workflow_id}/execute", post(execute_workflow))
        .route("/admin/jobs", get(list_jobs))
        .route("/admin/jobs/{job_name}/trigger", post(trigger_job))
}

/// GET /admin/workflows
async fn list_workflows(State(state): State<AppState>) -> Json<ApiResponse<Vec<WorkflowSummary>>> {
    ok(state.workflows.definitions())
}

/// GET /admin/workflows/{workflow_id}/history?limit=
async fn workflow_history(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<Vec<ExecutionRecord>>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);
    Ok(ok(state.workflows.history(&workflow_id, limit).await?))
}

/// POST /admin/workflows/{workflow_id}/execute
///
/// The body, if any, is passed to the workflow as its input.
async fn execute_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WorkflowOutcome>>> {
    let data: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(|e| CoreError::validation("body", e.to_string()))?
    };

    info!(workflow_id = %workflow_id, "Manual workflow execution");
    Ok(ok(state.workflows.execute(&workflow_id, data).await?))
}

/// GET /admin/jobs
async fn list_jobs(State(state): State<AppState>) -> Json<ApiResponse<Vec<Value>>> {
    let now = chrono::Utc::now();
    let jobs = state
        .scheduler
        .jobs()
        .iter()
        .map(|job| {
            json!({
                "name": job.name,
                "workflowId": job.workflow_id,
                "nextRun": job.schedule.next_after(now),
            })
        })
        .collect();
    ok(jobs)
}

/// POST /admin/jobs/{job_name}/trigger
async fn trigger_job(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> AppResult<Json<ApiResponse<Value>>> {
    info!(job = %job_name, "Manual job trigger");
    let data = match state.scheduler.trigger(&job_name).await? {
        JobRun::Completed(outcome) => json!({ "ran": true, "outcome": outcome }),
        JobRun::LeaseHeld => json!({ "ran": false, "reason": "lease_held" }),
    };
    Ok(ok(data))
}
