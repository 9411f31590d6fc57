//! User, role and permission management.
//!
//! Every successful write is recorded in the audit trail with the acting
//! user and, for assignments, the before/after ID lists.

use tracing::info;
use warden_core::audit::record_quietly;
use warden_core::auth::password::hash_password;
use warden_core::models::audit::{AuditEntry, Severity};
use warden_core::models::auth::{AccessClaims, UserProfile};
use warden_core::models::rbac::{
    NewPermission, NewRole, NewUser, Permission, Role, RoleUpdate, RoleWithPermissions, UserUpdate,
};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreatePermissionRequest, CreateRoleRequest, CreateUserRequest, ListUsersQuery, MAX_PAGE_SIZE,
    MeResponse, UpdateRoleRequest, UpdateUserRequest, permission_list,
};

const ROLE_MODULE: &str = "role_management";
const USER_MODULE: &str = "user_management";

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_some_non_empty(field: &str, value: Option<&str>) -> AppResult<()> {
    value.map_or(Ok(()), |v| require_non_empty(field, v))
}

fn snapshot<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn id_list(ids: &[i64]) -> String {
    serde_json::to_string(ids).unwrap_or_default()
}

fn entry(actor: &AccessClaims, action: &str, resource: &str) -> AuditEntry {
    AuditEntry::new(action)
        .actor(Some(actor.subject_id), Some(&actor.username))
        .resource(resource)
}

pub async fn create_role(
    state: &AppState,
    actor: &AccessClaims,
    body: CreateRoleRequest,
) -> AppResult<Role> {
    require_non_empty("name", &body.name)?;
    require_non_empty("display_name", &body.display_name)?;

    let role = state
        .directory
        .create_role(NewRole {
            name: body.name.trim().to_string(),
            display_name: body.display_name,
            description: body.description,
            is_active: body.is_active,
        })
        .await?;

    info!(role_id = role.id, user_id = actor.subject_id, "role created");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "create_role", "roles")
            .details(format!("Created role {}", role.name))
            .module(ROLE_MODULE),
    )
    .await;
    Ok(role)
}

pub async fn get_role(state: &AppState, role_id: i64) -> AppResult<RoleWithPermissions> {
    state
        .directory
        .get_role(role_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Role not found".into()))
}

/// Apply a partial role update. At least one field must be given.
pub async fn update_role(
    state: &AppState,
    actor: &AccessClaims,
    role_id: i64,
    body: UpdateRoleRequest,
) -> AppResult<RoleWithPermissions> {
    require_some_non_empty("name", body.name.as_deref())?;
    require_some_non_empty("display_name", body.display_name.as_deref())?;
    let update = RoleUpdate {
        name: body.name.map(|n| n.trim().to_string()),
        display_name: body.display_name,
        description: body.description,
        is_active: body.is_active,
    };
    if update.is_empty() {
        return Err(AppError::Validation("No fields to update".into()));
    }

    let before = get_role(state, role_id).await?.role;
    let after = state.directory.update_role(role_id, update).await?;

    info!(role_id, user_id = actor.subject_id, "role updated");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "update_role", "roles")
            .details(format!("Updated role {} ({})", before.display_name, before.name))
            .severity(Severity::Medium)
            .module(ROLE_MODULE)
            .change(snapshot(&before), snapshot(&after)),
    )
    .await;
    get_role(state, role_id).await
}

/// Delete a role. Its permission grants and user assignments go with it.
pub async fn delete_role(state: &AppState, actor: &AccessClaims, role_id: i64) -> AppResult<Role> {
    let removed = state.directory.delete_role(role_id).await?;

    info!(role_id, user_id = actor.subject_id, "role deleted");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "delete_role", "roles")
            .details(format!("Deleted role {} ({})", removed.display_name, removed.name))
            .severity(Severity::High)
            .module(ROLE_MODULE)
            .before(snapshot(&removed)),
    )
    .await;
    Ok(removed)
}

/// Replace a role's permissions.
pub async fn assign_permissions(
    state: &AppState,
    actor: &AccessClaims,
    role_id: i64,
    permission_ids: &[i64],
) -> AppResult<()> {
    let previous = state
        .directory
        .assign_permissions_to_role(role_id, permission_ids)
        .await?;

    info!(role_id, count = permission_ids.len(), "role permissions replaced");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "assign_permissions", "roles")
            .details(format!("Assigned permissions to role {role_id}"))
            .severity(Severity::Medium)
            .module(ROLE_MODULE)
            .change(id_list(&previous), id_list(permission_ids)),
    )
    .await;
    Ok(())
}

pub async fn create_permission(
    state: &AppState,
    actor: &AccessClaims,
    body: CreatePermissionRequest,
) -> AppResult<Permission> {
    require_non_empty("name", &body.name)?;
    require_non_empty("resource", &body.resource)?;
    require_non_empty("action", &body.action)?;

    let permission = state
        .directory
        .create_permission(NewPermission {
            name: body.name.trim().to_string(),
            display_name: body.display_name,
            description: body.description,
            resource: body.resource.trim().to_string(),
            action: body.action.trim().to_string(),
        })
        .await?;

    info!(permission_id = permission.id, "permission created");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "create_permission", "permissions")
            .details(format!("Created permission {}", permission.name))
            .module(ROLE_MODULE),
    )
    .await;
    Ok(permission)
}

pub async fn create_user(
    state: &AppState,
    actor: &AccessClaims,
    body: CreateUserRequest,
) -> AppResult<UserProfile> {
    require_non_empty("username", &body.username)?;
    require_non_empty("email", &body.email)?;

    let password_hash = match body.password.as_deref() {
        Some("") => return Err(AppError::Validation("password must not be empty".into())),
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let user = state
        .directory
        .create_user(NewUser {
            username: body.username.trim().to_string(),
            email: body.email.trim().to_string(),
            full_name: body.full_name,
            is_active: body.is_active,
            password_hash,
        })
        .await?;

    info!(user_id = user.id, created_by = actor.subject_id, "user created");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "create_user", "users")
            .details(format!("Created user {}", user.username))
            .module(USER_MODULE),
    )
    .await;
    Ok(user)
}

pub async fn list_users(state: &AppState, query: &ListUsersQuery) -> AppResult<Vec<UserProfile>> {
    if query.skip < 0 {
        return Err(AppError::Validation("skip must not be negative".into()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&query.limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(state
        .directory
        .list_users(query.active_only, query.skip, query.limit)
        .await?)
}

/// Profile, assigned roles and freshly resolved permissions of one user.
pub async fn user_detail(state: &AppState, user_id: i64) -> AppResult<MeResponse> {
    let user = state
        .directory
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let roles = state.directory.list_roles_for_user(user_id).await?;
    let permissions = state.auth.resolver().resolve(user_id).await?;
    Ok(MeResponse {
        user,
        roles,
        permissions: permission_list(&permissions),
    })
}

/// Apply a partial user update, replacing the user's roles when `role_ids`
/// is given.
pub async fn update_user(
    state: &AppState,
    actor: &AccessClaims,
    user_id: i64,
    body: UpdateUserRequest,
) -> AppResult<MeResponse> {
    require_some_non_empty("username", body.username.as_deref())?;
    require_some_non_empty("email", body.email.as_deref())?;
    let update = UserUpdate {
        username: body.username.map(|u| u.trim().to_string()),
        email: body.email.map(|e| e.trim().to_string()),
        full_name: body.full_name,
        is_active: body.is_active,
    };

    let before = state
        .directory
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !update.is_empty() {
        let after = state.directory.update_user(user_id, update).await?;
        info!(user_id, updated_by = actor.subject_id, "user updated");
        record_quietly(
            state.audit.as_ref(),
            entry(actor, "update_user", "users")
                .details(format!("Updated user {} ({})", before.full_name, before.username))
                .severity(Severity::Medium)
                .module(USER_MODULE)
                .change(snapshot(&before), snapshot(&after)),
        )
        .await;
    }
    if let Some(role_ids) = body.role_ids.as_deref() {
        assign_roles(state, actor, user_id, role_ids).await?;
    }
    user_detail(state, user_id).await
}

/// Delete a user and their role assignments.
pub async fn delete_user(
    state: &AppState,
    actor: &AccessClaims,
    user_id: i64,
) -> AppResult<UserProfile> {
    let removed = state.directory.delete_user(user_id).await?;

    info!(user_id, deleted_by = actor.subject_id, "user deleted");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "delete_user", "users")
            .details(format!("Deleted user {} ({})", removed.full_name, removed.username))
            .severity(Severity::High)
            .module(USER_MODULE)
            .before(snapshot(&removed)),
    )
    .await;
    Ok(removed)
}

/// Replace a user's roles.
pub async fn assign_roles(
    state: &AppState,
    actor: &AccessClaims,
    user_id: i64,
    role_ids: &[i64],
) -> AppResult<()> {
    let previous = state
        .directory
        .assign_roles_to_user(user_id, role_ids, Some(actor.subject_id))
        .await?;

    info!(user_id, count = role_ids.len(), "user roles replaced");
    record_quietly(
        state.audit.as_ref(),
        entry(actor, "assign_roles", "users")
            .details(format!("Assigned roles to user {user_id}"))
            .severity(Severity::Medium)
            .module(USER_MODULE)
            .change(id_list(&previous), id_list(role_ids)),
    )
    .await;
    Ok(())
}
