//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use warden_core::auth::AuthError;
use warden_core::store::StoreError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database unavailable: {0}")]
    DbUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Conflict(m) => (StatusCode::BAD_REQUEST, "conflict", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::AccountInactive => (
                StatusCode::UNAUTHORIZED,
                "account_inactive",
                "Account is inactive",
            ),
            AppError::AccountLocked => (
                StatusCode::LOCKED,
                "account_locked",
                "Account is temporarily locked due to too many failed attempts",
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::DbUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "db_unavailable",
                "Credential store unavailable",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };
        if let AppError::DbUnavailable(detail) | AppError::Internal(detail) = &self {
            error!(status = status.as_u16(), "{detail}");
        }
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Database(e) => AppError::DbUnavailable(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => {
                AppError::Unauthorized("Invalid username or password".into())
            }
            AuthError::InvalidToken => AppError::Unauthorized("Invalid or expired token".into()),
            AuthError::AccountInactive => AppError::AccountInactive,
            AuthError::AccountLocked => AppError::AccountLocked,
            AuthError::PermissionDenied(msg) => AppError::Forbidden(msg),
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            // Contention and outages alike are infrastructure failures here.
            AuthError::StoreUnavailable(e) => AppError::DbUnavailable(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: impl Into<AppError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(status_of(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::InvalidToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::AccountInactive), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AuthError::AccountLocked), StatusCode::LOCKED);
        assert_eq!(
            status_of(AuthError::PermissionDenied("admin.all required".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(AuthError::UserNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AuthError::Validation("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AuthError::StoreUnavailable(StoreError::Conflict("busy".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AuthError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(
            status_of(StoreError::Conflict("dup".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(StoreError::NotFound("role 1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(StoreError::Database(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
