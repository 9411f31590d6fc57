//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialStore, Directory, StoreError};
use crate::auth::queries::{self, USER_COLUMNS, UserRow, user_from_row};
use crate::models::auth::{LockoutState, UserProfile, UserRecord};
use crate::models::rbac::{
    NewPermission, NewRole, NewUser, Permission, PermissionCheck, Role, RoleUpdate,
    RoleWithPermissions, UserUpdate,
};

const ROLE_COLUMNS: &str = "id, name, display_name, description, is_active, created_at, updated_at";

type RoleRow = (
    i64,
    String,
    String,
    Option<String>,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

type PermissionRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    DateTime<Utc>,
);

fn role_from_row(row: RoleRow) -> Role {
    let (id, name, display_name, description, is_active, created_at, updated_at) = row;
    Role {
        id,
        name,
        display_name,
        description,
        is_active,
        created_at,
        updated_at,
    }
}

fn permission_from_row(row: PermissionRow) -> Permission {
    let (id, name, display_name, description, resource, action, created_at) = row;
    Permission {
        id,
        name,
        display_name,
        description,
        resource,
        action,
        created_at,
    }
}

/// Map constraint violations onto store errors.
fn classify(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(format!("{what} already exists"));
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound(format!("{what} references a missing row"));
        }
    }
    StoreError::Database(e)
}

/// Store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn permissions_for_role(&self, role_id: i64) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT p.id, p.name, p.display_name, p.description, p.resource, p.action, p.created_at \
             FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = $1 \
             ORDER BY p.name",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(permission_from_row).collect())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        queries::find_user_by_username_or_email(&self.pool, identifier).await
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        queries::find_user_by_id(&self.pool, user_id).await
    }

    async fn update_lockout_fields(
        &self,
        user_id: i64,
        expected_failed_attempts: Option<i32>,
        next: &LockoutState,
    ) -> Result<bool, StoreError> {
        queries::update_lockout_fields(&self.pool, user_id, expected_failed_attempts, next).await
    }

    async fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        queries::update_last_login(&self.pool, user_id, at).await
    }

    async fn record_login_success(
        &self,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        queries::record_login_success(&self.pool, user_id, at).await
    }

    async fn set_credential_hash(&self, user_id: i64, hash: &str) -> Result<(), StoreError> {
        queries::set_credential_hash(&self.pool, user_id, hash).await
    }

    async fn list_active_role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        queries::list_active_role_ids_for_user(&self.pool, user_id).await
    }

    async fn list_permission_names_for_roles(
        &self,
        role_ids: &[i64],
    ) -> Result<Vec<String>, StoreError> {
        queries::list_permission_names_for_roles(&self.pool, role_ids).await
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<UserProfile, StoreError> {
        let row = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO users (username, email, full_name, is_active, password_hash) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, created_at",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.is_active)
        .bind(user.password_hash.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "username or email"))?;

        Ok(UserProfile {
            id: row.0,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            last_login: None,
            created_at: row.1,
        })
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, StoreError> {
        let user = queries::find_user_by_id(&self.pool, user_id).await?;
        Ok(user.map(|u| u.profile()))
    }

    async fn list_users(
        &self,
        active_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, StoreError> {
        let users = queries::list_users(&self.pool, active_only, offset, limit).await?;
        Ok(users.iter().map(UserRecord::profile).collect())
    }

    async fn update_user(
        &self,
        user_id: i64,
        update: UserUpdate,
    ) -> Result<UserProfile, StoreError> {
        let sql = format!(
            "UPDATE users SET \
             username = COALESCE($2, username), \
             email = COALESCE($3, email), \
             full_name = COALESCE($4, full_name), \
             is_active = COALESCE($5, is_active) \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .bind(update.username.as_deref())
            .bind(update.email.as_deref())
            .bind(update.full_name.as_deref())
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, "username or email"))?;
        row.map(|r| user_from_row(r).profile())
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    async fn delete_user(&self, user_id: i64) -> Result<UserProfile, StoreError> {
        let sql = format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(r).profile())
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    async fn create_role(&self, role: NewRole) -> Result<Role, StoreError> {
        let row = sqlx::query_as::<_, RoleRow>(
            "INSERT INTO roles (name, display_name, description, is_active) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, display_name, description, is_active, created_at, updated_at",
        )
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(role.description.as_deref())
        .bind(role.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "role name"))?;
        Ok(role_from_row(row))
    }

    async fn list_roles(&self, active_only: bool) -> Result<Vec<RoleWithPermissions>, StoreError> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT id, name, display_name, description, is_active, created_at, updated_at \
             FROM roles \
             WHERE is_active OR NOT $1 \
             ORDER BY display_name",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            let role = role_from_row(row);
            let permissions = self.permissions_for_role(role.id).await?;
            roles.push(RoleWithPermissions { role, permissions });
        }
        Ok(roles)
    }

    async fn get_role(&self, role_id: i64) -> Result<Option<RoleWithPermissions>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let role = role_from_row(row);
        let permissions = self.permissions_for_role(role.id).await?;
        Ok(Some(RoleWithPermissions { role, permissions }))
    }

    async fn update_role(&self, role_id: i64, update: RoleUpdate) -> Result<Role, StoreError> {
        let sql = format!(
            "UPDATE roles SET \
             name = COALESCE($2, name), \
             display_name = COALESCE($3, display_name), \
             description = COALESCE($4, description), \
             is_active = COALESCE($5, is_active), \
             updated_at = now() \
             WHERE id = $1 \
             RETURNING {ROLE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id)
            .bind(update.name.as_deref())
            .bind(update.display_name.as_deref())
            .bind(update.description.as_deref())
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, "role name"))?;
        row.map(role_from_row)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))
    }

    async fn delete_role(&self, role_id: i64) -> Result<Role, StoreError> {
        let sql = format!("DELETE FROM roles WHERE id = $1 RETURNING {ROLE_COLUMNS}");
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(role_from_row)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))
    }

    async fn create_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, StoreError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "INSERT INTO permissions (name, display_name, description, resource, action) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, name, display_name, description, resource, action, created_at",
        )
        .bind(&permission.name)
        .bind(&permission.display_name)
        .bind(permission.description.as_deref())
        .bind(&permission.resource)
        .bind(&permission.action)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, "permission name"))?;
        Ok(permission_from_row(row))
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT id, name, display_name, description, resource, action, created_at \
             FROM permissions \
             ORDER BY resource, action",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(permission_from_row).collect())
    }

    async fn assign_permissions_to_role(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }

        let previous = sqlx::query_scalar::<_, i64>(
            "SELECT permission_id FROM role_permissions WHERE role_id = $1 ORDER BY permission_id",
        )
        .bind(role_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1, UNNEST($2::BIGINT[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, "permission"))?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn assign_roles_to_user(
        &self,
        user_id: i64,
        role_ids: &[i64],
        assigned_by: Option<i64>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }

        let previous = sqlx::query_scalar::<_, i64>(
            "SELECT role_id FROM user_roles WHERE user_id = $1 ORDER BY role_id",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id, assigned_by) \
             SELECT $1, UNNEST($2::BIGINT[]), $3 \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_ids)
        .bind(assigned_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, "role"))?;

        tx.commit().await?;
        Ok(previous)
    }

    async fn list_roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query_as::<_, RoleRow>(
            "SELECT r.id, r.name, r.display_name, r.description, r.is_active, r.created_at, r.updated_at \
             FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 \
             ORDER BY r.display_name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(role_from_row).collect())
    }

    async fn check_permission(
        &self,
        user_id: i64,
        resource: &str,
        action: &str,
    ) -> Result<PermissionCheck, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT DISTINCT p.name, r.name \
             FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             JOIN role_permissions rp ON rp.role_id = r.id \
             JOIN permissions p ON p.id = rp.permission_id \
             WHERE ur.user_id = $1 AND p.resource = $2 AND p.action = $3 AND r.is_active",
        )
        .bind(user_id)
        .bind(resource)
        .bind(action)
        .fetch_all(&self.pool)
        .await?;

        let mut check = PermissionCheck {
            has_permission: !rows.is_empty(),
            ..Default::default()
        };
        for (permission, role) in rows {
            if !check.permissions.contains(&permission) {
                check.permissions.push(permission);
            }
            if !check.roles.contains(&role) {
                check.roles.push(role);
            }
        }
        check.permissions.sort();
        check.roles.sort();
        Ok(check)
    }
}
