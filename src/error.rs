use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Request-level failure. Every variant is terminal for the request; nothing
/// in the service retries.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The target exists but is in the wrong state (e.g. an intake session
    /// that was already used).
    #[error("{0}")]
    FailedPrecondition(String),

    /// Time-limited credential past its deadline.
    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("{0}")]
    Dependency(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Classified error code surfaced to callers alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) | Self::UnprocessableEntity(_) => "invalid-argument",
            Self::Unauthorized(_) => "unauthenticated",
            Self::Forbidden(_) => "permission-denied",
            Self::NotFound(_) => "not-found",
            Self::Conflict(_) => "already-exists",
            Self::FailedPrecondition(_) => "failed-precondition",
            Self::Gone(_) => "deadline-exceeded",
            Self::Dependency(_) | Self::ServiceUnavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            Self::Gone(_) => StatusCode::GONE,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "An internal error occurred.".to_string()
            }
            Self::Dependency(detail) => {
                tracing::error!(error = %detail, "Dependency failure");
                detail.clone()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });
        (status, axum::Json(body)).into_response()
    }
}
