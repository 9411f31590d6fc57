//! User request handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use warden_core::models::auth::UserProfile;
use warden_core::models::rbac::Role;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AssignRolesRequest, CreateUserRequest, ListUsersQuery, MeResponse, MessageResponse,
    UpdateUserRequest,
};
use crate::services::directory;

/// `POST /api/users`: create a user.
pub async fn create_user_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    user.require("users.create")?;
    let created = directory::create_user(&state, &user.0, body).await?;
    Ok(Json(created))
}

/// `GET /api/users`: page through users, newest first.
pub async fn list_users_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<Json<Vec<UserProfile>>> {
    user.require("users.read")?;
    Ok(Json(directory::list_users(&state, &query).await?))
}

/// `GET /api/users/{user_id}`: a user with roles and permissions.
pub async fn get_user_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<MeResponse>> {
    user.require("users.read")?;
    Ok(Json(directory::user_detail(&state, user_id).await?))
}

/// `PUT /api/users/{user_id}`: partial update, optionally replacing roles.
pub async fn update_user_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<MeResponse>> {
    user.require("users.update")?;
    let updated = directory::update_user(&state, &user.0, user_id, body).await?;
    Ok(Json(updated))
}

/// `DELETE /api/users/{user_id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    user.require("users.delete")?;
    let removed = directory::delete_user(&state, &user.0, user_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "User {} deleted successfully",
        removed.username
    ))))
}

/// `GET /api/users/{user_id}/roles`: roles assigned to a user.
pub async fn list_user_roles_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<Role>>> {
    user.require("users.read")?;
    if state.directory.get_user(user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(Json(state.directory.list_roles_for_user(user_id).await?))
}

/// `POST /api/users/{user_id}/roles`: replace a user's roles.
pub async fn assign_roles_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
    Json(body): Json<AssignRolesRequest>,
) -> AppResult<Json<MessageResponse>> {
    user.require("users.update")?;
    directory::assign_roles(&state, &user.0, user_id, &body.role_ids).await?;
    Ok(Json(MessageResponse::new("Roles assigned successfully")))
}
