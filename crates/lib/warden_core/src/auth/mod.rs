//! Authentication and authorization logic.
//!
//! Provides password hashing, JWT management, the lockout policy, permission
//! resolution, and the login/refresh/password protocol built on top of them.

pub mod authenticator;
pub mod jwt;
pub mod lockout;
pub mod password;
pub mod permissions;
pub mod queries;

use thiserror::Error;

use crate::store::StoreError;

/// Permission that authorizes administrative operations.
pub const ADMIN_PERMISSION: &str = "admin.all";

/// Authentication errors.
///
/// Unknown users and wrong passwords both surface as `InvalidCredentials`;
/// every token failure surfaces as `InvalidToken`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is temporarily locked due to too many failed attempts")]
    AccountLocked,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
