//! Administrator bootstrap.

use log::info;
use warden_core::auth::ADMIN_PERMISSION;
use warden_core::auth::password::hash_password;
use warden_core::models::auth::UserProfile;
use warden_core::models::rbac::{NewPermission, NewRole, NewUser};
use warden_core::store::Directory;

use crate::{Error, Result};

pub const ADMIN_ROLE: &str = "admin";

/// Permissions the administrator role always carries.
pub const MANAGEMENT_PERMISSIONS: &[&str] = &[
    ADMIN_PERMISSION,
    "roles.read",
    "roles.create",
    "roles.update",
    "roles.delete",
    "permissions.read",
    "permissions.create",
    "users.read",
    "users.create",
    "users.update",
    "users.delete",
];

pub struct AdminSpec {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Ensure the management permissions and the admin role exist, then create
/// the user and give them the role.
///
/// Safe to run repeatedly for different users; existing permissions and the
/// existing role are reused.
pub async fn create_admin(directory: &dyn Directory, spec: AdminSpec) -> Result<UserProfile> {
    if spec.password.is_empty() {
        return Err(Error::Custom("password must not be empty".into()));
    }

    let existing = directory.list_permissions().await?;
    let mut permission_ids = Vec::with_capacity(MANAGEMENT_PERMISSIONS.len());
    for name in MANAGEMENT_PERMISSIONS {
        if let Some(p) = existing.iter().find(|p| p.name == *name) {
            permission_ids.push(p.id);
            continue;
        }
        let (resource, action) = name
            .split_once('.')
            .ok_or_else(|| Error::Custom(format!("malformed permission name {name}")))?;
        let created = directory
            .create_permission(NewPermission {
                name: name.to_string(),
                display_name: name.to_string(),
                description: None,
                resource: resource.into(),
                action: action.into(),
            })
            .await?;
        info!("created permission {}", created.name);
        permission_ids.push(created.id);
    }

    let roles = directory.list_roles(false).await?;
    let role = match roles.into_iter().find(|r| r.role.name == ADMIN_ROLE) {
        Some(r) => {
            for p in r.permissions {
                if !permission_ids.contains(&p.id) {
                    permission_ids.push(p.id);
                }
            }
            r.role
        }
        None => {
            let role = directory
                .create_role(NewRole {
                    name: ADMIN_ROLE.into(),
                    display_name: "Administrator".into(),
                    description: Some("Full administrative access".into()),
                    is_active: true,
                })
                .await?;
            info!("created role {}", role.name);
            role
        }
    };
    directory
        .assign_permissions_to_role(role.id, &permission_ids)
        .await?;

    let user = directory
        .create_user(NewUser {
            username: spec.username,
            email: spec.email,
            full_name: spec.full_name,
            is_active: true,
            password_hash: Some(hash_password(&spec.password)?),
        })
        .await?;
    directory
        .assign_roles_to_user(user.id, &[role.id], None)
        .await?;
    info!("created administrator {} (id {})", user.username, user.id);
    Ok(user)
}
