use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::reconciler::ReconcileError;
use crate::services::retry::RetryError;

/// Coarse classification shared by every service error, used by callers that
/// decide whether to retry, alert, or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Configuration,
    InvariantViolation,
    LockTimeout,
    Provider,
    Storage,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::InvariantViolation => AppError::BadRequest(message),
            ErrorKind::LockTimeout => AppError::Conflict(message),
            ErrorKind::Provider => AppError::Upstream(message),
            ErrorKind::Configuration | ErrorKind::Storage => AppError::Internal(message),
        }
    }
}

impl From<RetryError> for AppError {
    fn from(e: RetryError) -> Self {
        AppError::from_kind(e.kind(), e.to_string())
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        AppError::from_kind(e.kind(), e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderError;
    use crate::services::lock::LockError;
    use uuid::Uuid;

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_retry_parent_not_found_maps_to_404() {
        let error: AppError = RetryError::ParentNotFound(Uuid::new_v4()).into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_retry_provider_error_maps_to_502() {
        let error: AppError = RetryError::Provider(ProviderError::Transport("reset".into())).into();
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_lock_timeout_maps_to_409() {
        let error: AppError = RetryError::Lock(LockError::Timeout {
            key: "settlement:x".to_string(),
            attempts: 10,
        })
        .into();
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_invalid_parent_maps_to_400() {
        let error: AppError = RetryError::InvalidParent {
            id: Uuid::new_v4(),
            reason: "not an originating leg".to_string(),
        }
        .into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_conflict_error_response() {
        let error = AppError::Conflict("busy".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
