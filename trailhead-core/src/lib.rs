pub mod coordination;
pub mod notify;
pub mod payment;
pub mod repository;

/// Domain error shared by every service in the workspace.
///
/// The API layer maps each variant onto an HTTP status; see
/// `trailhead-api/src/error.rs`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed for {field}: {message}")]
    ValidationError { field: String, message: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Availability exhausted: requested {requested}, available {available}")]
    AvailabilityExhausted { requested: u32, available: u32 },
    #[error("Upstream service error: {0}")]
    UpstreamError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::InternalError(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
