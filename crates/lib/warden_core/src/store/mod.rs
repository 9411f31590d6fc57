//! Credential store contracts.
//!
//! `CredentialStore` is what the authentication core reads and writes.
//! `Directory` is the management surface over users, roles and permissions.
//! Both are implemented for PostgreSQL (`PgStore`) and in memory
//! (`MemoryStore`).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{LockoutState, UserProfile, UserRecord};
use crate::models::rbac::{
    NewPermission, NewRole, NewUser, Permission, PermissionCheck, Role, RoleUpdate,
    RoleWithPermissions, UserUpdate,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Read/write contract consumed by the authentication core.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user whose username or email equals `identifier`.
    ///
    /// A username match wins over another user's email match.
    async fn find_user_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Write the lockout fields.
    ///
    /// With `expected_failed_attempts` set, the write only happens if the
    /// stored counter still equals it; returns whether a row was updated.
    async fn update_lockout_fields(
        &self,
        user_id: i64,
        expected_failed_attempts: Option<i32>,
        next: &LockoutState,
    ) -> Result<bool, StoreError>;

    async fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Clear the lockout fields and stamp `last_login = at` in one write.
    ///
    /// Returns `false` without writing when the account carries a lock that
    /// is still in force at `at`.
    async fn record_login_success(
        &self,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_credential_hash(&self, user_id: i64, hash: &str) -> Result<(), StoreError>;

    /// IDs of the user's roles that are currently active.
    async fn list_active_role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, StoreError>;

    /// Permission names granted by any of `role_ids`. May contain duplicates.
    async fn list_permission_names_for_roles(
        &self,
        role_ids: &[i64],
    ) -> Result<Vec<String>, StoreError>;
}

/// Management operations over the user/role/permission graph.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Create a user, failing with `Conflict` on a duplicate username or email.
    async fn create_user(&self, user: NewUser) -> Result<UserProfile, StoreError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, StoreError>;

    /// Users, newest first.
    async fn list_users(
        &self,
        active_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, StoreError>;

    /// Apply `update`, failing with `NotFound` for an unknown user and
    /// `Conflict` when the new username or email is taken.
    async fn update_user(
        &self,
        user_id: i64,
        update: UserUpdate,
    ) -> Result<UserProfile, StoreError>;

    /// Delete a user and their role assignments. Returns the deleted profile.
    async fn delete_user(&self, user_id: i64) -> Result<UserProfile, StoreError>;

    async fn create_role(&self, role: NewRole) -> Result<Role, StoreError>;

    async fn list_roles(&self, active_only: bool) -> Result<Vec<RoleWithPermissions>, StoreError>;

    async fn get_role(&self, role_id: i64) -> Result<Option<RoleWithPermissions>, StoreError>;

    async fn update_role(&self, role_id: i64, update: RoleUpdate) -> Result<Role, StoreError>;

    /// Delete a role and every assignment that references it.
    async fn delete_role(&self, role_id: i64) -> Result<Role, StoreError>;

    async fn create_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, StoreError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    /// Replace the role's permissions with `permission_ids`.
    /// Returns the previous permission IDs.
    async fn assign_permissions_to_role(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError>;

    /// Replace the user's roles with `role_ids`. Returns the previous role IDs.
    async fn assign_roles_to_user(
        &self,
        user_id: i64,
        role_ids: &[i64],
        assigned_by: Option<i64>,
    ) -> Result<Vec<i64>, StoreError>;

    async fn list_roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, StoreError>;

    async fn check_permission(
        &self,
        user_id: i64,
        resource: &str,
        action: &str,
    ) -> Result<PermissionCheck, StoreError>;
}
