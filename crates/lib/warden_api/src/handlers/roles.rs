//! Role request handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use warden_core::models::rbac::{Role, RoleWithPermissions};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AssignPermissionsRequest, CreateRoleRequest, ListRolesQuery, MessageResponse,
    UpdateRoleRequest,
};
use crate::services::directory;

/// `GET /api/roles`: list roles with their permissions.
pub async fn list_roles_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<ListRolesQuery>,
) -> AppResult<Json<Vec<RoleWithPermissions>>> {
    user.require("roles.read")?;
    let roles = state.directory.list_roles(query.active_only).await?;
    Ok(Json(roles))
}

/// `POST /api/roles`: create a role.
pub async fn create_role_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<CreateRoleRequest>,
) -> AppResult<Json<Role>> {
    user.require("roles.create")?;
    let role = directory::create_role(&state, &user.0, body).await?;
    Ok(Json(role))
}

/// `GET /api/roles/{role_id}`: one role with its permissions.
pub async fn get_role_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(role_id): Path<i64>,
) -> AppResult<Json<RoleWithPermissions>> {
    user.require("roles.read")?;
    Ok(Json(directory::get_role(&state, role_id).await?))
}

/// `PUT /api/roles/{role_id}`: partial update.
pub async fn update_role_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(role_id): Path<i64>,
    Json(body): Json<UpdateRoleRequest>,
) -> AppResult<Json<RoleWithPermissions>> {
    user.require("roles.update")?;
    let role = directory::update_role(&state, &user.0, role_id, body).await?;
    Ok(Json(role))
}

/// `DELETE /api/roles/{role_id}`
pub async fn delete_role_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(role_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    user.require("roles.delete")?;
    let removed = directory::delete_role(&state, &user.0, role_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Role {} deleted successfully",
        removed.name
    ))))
}

/// `POST /api/roles/{role_id}/permissions`: replace a role's permissions.
pub async fn assign_permissions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(role_id): Path<i64>,
    Json(body): Json<AssignPermissionsRequest>,
) -> AppResult<Json<MessageResponse>> {
    user.require("roles.update")?;
    directory::assign_permissions(&state, &user.0, role_id, &body.permission_ids).await?;
    Ok(Json(MessageResponse::new("Permissions assigned successfully")))
}
