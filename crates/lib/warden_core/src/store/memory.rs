//! In-memory store.
//!
//! Used by tests and local development. All state lives behind one
//! `RwLock`, so every operation is atomic with respect to the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CredentialStore, Directory, StoreError};
use crate::models::auth::{LockoutState, UserProfile, UserRecord};
use crate::models::rbac::{
    NewPermission, NewRole, NewUser, Permission, PermissionCheck, Role, RoleUpdate,
    RoleWithPermissions, UserUpdate,
};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, UserRecord>,
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    /// (role_id, permission_id)
    role_permissions: BTreeSet<(i64, i64)>,
    /// (user_id, role_id)
    user_roles: BTreeSet<(i64, i64)>,
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, user_id: i64) -> Result<&mut UserRecord, StoreError> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    fn role_mut(&mut self, role_id: i64) -> Result<&mut Role, StoreError> {
        self.roles
            .get_mut(&role_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))
    }

    fn with_permissions(&self, role: &Role) -> RoleWithPermissions {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(rid, _)| *rid == role.id)
            .filter_map(|(_, pid)| self.permissions.get(pid).cloned())
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        RoleWithPermissions {
            role: role.clone(),
            permissions,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.read();
        let by_username = inner.users.values().find(|u| u.username == identifier);
        Ok(by_username
            .or_else(|| inner.users.values().find(|u| u.email == identifier))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.read().users.get(&user_id).cloned())
    }

    async fn update_lockout_fields(
        &self,
        user_id: i64,
        expected_failed_attempts: Option<i32>,
        next: &LockoutState,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write();
        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(expected) = expected_failed_attempts
            && user.lockout.failed_attempts != expected
        {
            return Ok(false);
        }
        user.lockout = next.clone();
        Ok(true)
    }

    async fn update_last_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write().user_mut(user_id)?.last_login = Some(at);
        Ok(())
    }

    async fn record_login_success(
        &self,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write();
        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if user.lockout.locked_until.is_some_and(|until| at < until) {
            return Ok(false);
        }
        user.lockout = LockoutState::default();
        user.last_login = Some(at);
        Ok(true)
    }

    async fn set_credential_hash(&self, user_id: i64, hash: &str) -> Result<(), StoreError> {
        self.write().user_mut(user_id)?.password_hash = Some(hash.to_string());
        Ok(())
    }

    async fn list_active_role_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, StoreError> {
        let inner = self.read();
        Ok(inner
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, rid)| *rid)
            .filter(|rid| inner.roles.get(rid).is_some_and(|r| r.is_active))
            .collect())
    }

    async fn list_permission_names_for_roles(
        &self,
        role_ids: &[i64],
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.read();
        Ok(inner
            .role_permissions
            .iter()
            .filter(|(rid, _)| role_ids.contains(rid))
            .filter_map(|(_, pid)| inner.permissions.get(pid))
            .map(|p| p.name.clone())
            .collect())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<UserProfile, StoreError> {
        let mut inner = self.write();
        if inner
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Conflict(
                "username or email already exists".into(),
            ));
        }
        let id = inner.allocate_id();
        let record = UserRecord {
            id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            password_hash: user.password_hash,
            lockout: LockoutState::default(),
            last_login: None,
            created_at: Utc::now(),
        };
        let profile = record.profile();
        inner.users.insert(id, record);
        Ok(profile)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.read().users.get(&user_id).map(UserRecord::profile))
    }

    async fn list_users(
        &self,
        active_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserProfile>, StoreError> {
        let inner = self.read();
        let mut users: Vec<&UserRecord> = inner
            .users
            .values()
            .filter(|u| u.is_active || !active_only)
            .collect();
        users.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(users
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(UserRecord::profile)
            .collect())
    }

    async fn update_user(
        &self,
        user_id: i64,
        update: UserUpdate,
    ) -> Result<UserProfile, StoreError> {
        let mut inner = self.write();
        inner.user_mut(user_id)?;
        let taken = inner.users.values().any(|u| {
            u.id != user_id
                && (update.username.as_deref() == Some(u.username.as_str())
                    || update.email.as_deref() == Some(u.email.as_str()))
        });
        if taken {
            return Err(StoreError::Conflict(
                "username or email already exists".into(),
            ));
        }
        let user = inner.user_mut(user_id)?;
        if let Some(username) = update.username {
            user.username = username;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(full_name) = update.full_name {
            user.full_name = full_name;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        Ok(user.profile())
    }

    async fn delete_user(&self, user_id: i64) -> Result<UserProfile, StoreError> {
        let mut inner = self.write();
        let removed = inner
            .users
            .remove(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        inner.user_roles.retain(|(uid, _)| *uid != user_id);
        Ok(removed.profile())
    }

    async fn create_role(&self, role: NewRole) -> Result<Role, StoreError> {
        let mut inner = self.write();
        if inner.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Conflict("role name already exists".into()));
        }
        let id = inner.allocate_id();
        let now = Utc::now();
        let role = Role {
            id,
            name: role.name,
            display_name: role.display_name,
            description: role.description,
            is_active: role.is_active,
            created_at: now,
            updated_at: now,
        };
        inner.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn list_roles(&self, active_only: bool) -> Result<Vec<RoleWithPermissions>, StoreError> {
        let inner = self.read();
        let mut roles: Vec<RoleWithPermissions> = inner
            .roles
            .values()
            .filter(|r| r.is_active || !active_only)
            .map(|role| inner.with_permissions(role))
            .collect();
        roles.sort_by(|a, b| a.role.display_name.cmp(&b.role.display_name));
        Ok(roles)
    }

    async fn get_role(&self, role_id: i64) -> Result<Option<RoleWithPermissions>, StoreError> {
        let inner = self.read();
        Ok(inner.roles.get(&role_id).map(|r| inner.with_permissions(r)))
    }

    async fn update_role(&self, role_id: i64, update: RoleUpdate) -> Result<Role, StoreError> {
        let mut inner = self.write();
        inner.role_mut(role_id)?;
        if let Some(name) = update.name.as_deref()
            && inner.roles.values().any(|r| r.id != role_id && r.name == name)
        {
            return Err(StoreError::Conflict("role name already exists".into()));
        }
        let role = inner.role_mut(role_id)?;
        if let Some(name) = update.name {
            role.name = name;
        }
        if let Some(display_name) = update.display_name {
            role.display_name = display_name;
        }
        if let Some(description) = update.description {
            role.description = Some(description);
        }
        if let Some(is_active) = update.is_active {
            role.is_active = is_active;
        }
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, role_id: i64) -> Result<Role, StoreError> {
        let mut inner = self.write();
        let removed = inner
            .roles
            .remove(&role_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
        inner.role_permissions.retain(|(rid, _)| *rid != role_id);
        inner.user_roles.retain(|(_, rid)| *rid != role_id);
        Ok(removed)
    }

    async fn create_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, StoreError> {
        let mut inner = self.write();
        if inner.permissions.values().any(|p| p.name == permission.name) {
            return Err(StoreError::Conflict("permission name already exists".into()));
        }
        let id = inner.allocate_id();
        let permission = Permission {
            id,
            name: permission.name,
            display_name: permission.display_name,
            description: permission.description,
            resource: permission.resource,
            action: permission.action,
            created_at: Utc::now(),
        };
        inner.permissions.insert(id, permission.clone());
        Ok(permission)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let mut permissions: Vec<Permission> = self.read().permissions.values().cloned().collect();
        permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(permissions)
    }

    async fn assign_permissions_to_role(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.write();
        if !inner.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if let Some(missing) = permission_ids
            .iter()
            .find(|pid| !inner.permissions.contains_key(pid))
        {
            return Err(StoreError::NotFound(format!("permission {missing}")));
        }
        let previous: Vec<i64> = inner
            .role_permissions
            .iter()
            .filter(|(rid, _)| *rid == role_id)
            .map(|(_, pid)| *pid)
            .collect();
        inner.role_permissions.retain(|(rid, _)| *rid != role_id);
        inner
            .role_permissions
            .extend(permission_ids.iter().map(|pid| (role_id, *pid)));
        Ok(previous)
    }

    async fn assign_roles_to_user(
        &self,
        user_id: i64,
        role_ids: &[i64],
        _assigned_by: Option<i64>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.write();
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        if let Some(missing) = role_ids.iter().find(|rid| !inner.roles.contains_key(rid)) {
            return Err(StoreError::NotFound(format!("role {missing}")));
        }
        let previous: Vec<i64> = inner
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, rid)| *rid)
            .collect();
        inner.user_roles.retain(|(uid, _)| *uid != user_id);
        inner
            .user_roles
            .extend(role_ids.iter().map(|rid| (user_id, *rid)));
        Ok(previous)
    }

    async fn list_roles_for_user(&self, user_id: i64) -> Result<Vec<Role>, StoreError> {
        let inner = self.read();
        let mut roles: Vec<Role> = inner
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, rid)| inner.roles.get(rid).cloned())
            .collect();
        roles.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(roles)
    }

    async fn check_permission(
        &self,
        user_id: i64,
        resource: &str,
        action: &str,
    ) -> Result<PermissionCheck, StoreError> {
        let inner = self.read();
        let mut roles = BTreeSet::new();
        let mut permissions = BTreeSet::new();
        for (_, rid) in inner.user_roles.iter().filter(|(uid, _)| *uid == user_id) {
            let Some(role) = inner.roles.get(rid).filter(|r| r.is_active) else {
                continue;
            };
            for (_, pid) in inner.role_permissions.iter().filter(|(r, _)| r == rid) {
                if let Some(p) = inner.permissions.get(pid)
                    && p.resource == resource
                    && p.action == action
                {
                    roles.insert(role.name.clone());
                    permissions.insert(p.name.clone());
                }
            }
        }
        Ok(PermissionCheck {
            has_permission: !permissions.is_empty(),
            roles: roles.into_iter().collect(),
            permissions: permissions.into_iter().collect(),
        })
    }
}
