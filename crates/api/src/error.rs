use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use epistle_core::error::CoreError;
use epistle_core::snapshot::JobSnapshot;
use epistle_research::StartError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON
/// error responses; conflict-class research errors carry the current
/// snapshot in the `data` field so clients can reconcile.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `epistle_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A research-start rejection that returns the authoritative
    /// snapshot alongside the error.
    #[error("{message}")]
    ResearchConflict {
        code: &'static str,
        message: String,
        job: Box<JobSnapshot>,
    },

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<StartError> for AppError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::AlreadyActive(job) => AppError::ResearchConflict {
                code: "RESEARCH_ACTIVE",
                message: "A research run is already active for this job".into(),
                job,
            },
            StartError::NotReady(job) => AppError::ResearchConflict {
                code: "NOT_READY",
                message: "Job is not ready to start research".into(),
                job,
            },
            StartError::InsufficientCredits {
                balance,
                required,
                job,
            } => AppError::ResearchConflict {
                code: "INSUFFICIENT_CREDITS",
                message: format!(
                    "Insufficient credits: balance {balance}, required {required}"
                ),
                job,
            },
            StartError::NoJob => AppError::Core(CoreError::NotFound { entity: "Job" }),
            StartError::Core(core) => AppError::Core(core),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Conflict-class errors embed the snapshot so the client can
        // reconcile without a second round trip.
        let (status, code, message, job) = match self {
            AppError::ResearchConflict { code, message, job } => {
                (StatusCode::CONFLICT, code, message, Some(job))
            }

            AppError::Core(core) => match core {
                CoreError::NotFound { entity } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} not found"),
                    None,
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None)
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
                CoreError::InsufficientCredits { balance, required } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "INSUFFICIENT_CREDITS",
                    format!("Insufficient credits: balance {balance}, required {required}"),
                    None,
                ),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None)
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                        None,
                    )
                }
            },

            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),

            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = match job {
            Some(job) => json!({ "error": message, "code": code, "data": job }),
            None => json!({ "error": message, "code": code }),
        };

        (status, axum::Json(body)).into_response()
    }
}
