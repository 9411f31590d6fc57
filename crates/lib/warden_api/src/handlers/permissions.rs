//! Permission request handlers.

use axum::Json;
use axum::extract::State;
use warden_core::models::rbac::Permission;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{CreatePermissionRequest, PermissionCheckRequest, PermissionCheckResponse};
use crate::services::directory;

/// `GET /api/permissions`: list every permission.
pub async fn list_permissions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<Permission>>> {
    user.require("permissions.read")?;
    Ok(Json(state.directory.list_permissions().await?))
}

/// `POST /api/permissions`: create a permission.
pub async fn create_permission_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<CreatePermissionRequest>,
) -> AppResult<Json<Permission>> {
    user.require("permissions.create")?;
    let permission = directory::create_permission(&state, &user.0, body).await?;
    Ok(Json(permission))
}

/// `POST /api/check-permission`: does a user hold `resource`/`action`?
pub async fn check_permission_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<PermissionCheckRequest>,
) -> AppResult<Json<PermissionCheckResponse>> {
    user.require("users.read")?;
    let check = state
        .directory
        .check_permission(body.user_id, &body.resource, &body.action)
        .await?;
    Ok(Json(check.into()))
}
