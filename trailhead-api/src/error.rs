use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use trailhead_core::CoreError;
use trailhead_workflow::WorkflowError;

/// Success envelope: `{ "success": true, "data": … }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data })
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Core(CoreError::validation("body", rejection.body_text()))
    }
}

fn core_parts(err: &CoreError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        CoreError::ValidationError { field, .. } => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", Some(field.clone()))
        }
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
        CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", None),
        CoreError::InvalidTransition { .. } => (StatusCode::BAD_REQUEST, "INVALID_STATE", None),
        CoreError::AvailabilityExhausted { .. } => {
            (StatusCode::BAD_REQUEST, "AVAILABILITY_EXHAUSTED", None)
        }
        CoreError::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", None),
        CoreError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, field, message) = match &self {
            AppError::Core(core) => {
                let (status, code, field) = core_parts(core);
                (status, code, field, core.to_string())
            }
            AppError::Workflow(WorkflowError::Core(core)) => {
                let (status, code, field) = core_parts(core);
                (status, code, field, core.to_string())
            }
            AppError::Workflow(err @ (WorkflowError::NotFound(_) | WorkflowError::JobNotFound(_))) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", None, err.to_string())
            }
            AppError::Workflow(err @ (WorkflowError::Duplicate(_) | WorkflowError::InvalidSchedule(_))) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None, err.to_string())
            }
            AppError::Workflow(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "WORKFLOW_FAILED", None, err.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", None, msg.clone()),
        };

        // Internal details stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code, "Internal server error");
            "Internal server error".to_string()
        } else {
            message
        };

        let mut body = json!({
            "success": false,
            "error": message,
            "code": code,
        });
        if let Some(field) = field {
            body["field"] = json!(field);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parts(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_error_carries_field() {
        let (status, body) = parts(CoreError::validation("guestInfo.email", "is required").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field"], "guestInfo.email");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (CoreError::not_found("Booking", 1), StatusCode::NOT_FOUND),
            (CoreError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (CoreError::transition("CANCELLED", "CONFIRMED"), StatusCode::BAD_REQUEST),
            (
                CoreError::AvailabilityExhausted { requested: 3, available: 1 },
                StatusCode::BAD_REQUEST,
            ),
            (CoreError::UpstreamError("down".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            let (status, body) = parts(err.into()).await;
            assert_eq!(status, expected);
            assert!(body.get("field").is_none());
        }
    }

    #[tokio::test]
    async fn test_internal_errors_are_masked() {
        let (status, body) = parts(CoreError::internal("connection refused on 10.0.0.3").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_workflow_errors() {
        let (status, _) = parts(WorkflowError::NotFound("nope".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let wrapped = WorkflowError::Core(CoreError::validation("bookingId", "is required"));
        let (status, body) = parts(wrapped.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "bookingId");
    }
}
