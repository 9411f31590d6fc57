//! Effective permission resolution over the user → role → permission graph.

use std::sync::Arc;

use crate::models::auth::PermissionSet;
use crate::store::{CredentialStore, StoreError};

/// Computes the union of permission names reachable through a user's
/// active roles.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn CredentialStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, user_id: i64) -> Result<PermissionSet, StoreError> {
        let role_ids = self.store.list_active_role_ids_for_user(user_id).await?;
        if role_ids.is_empty() {
            return Ok(PermissionSet::new());
        }
        let names = self
            .store
            .list_permission_names_for_roles(&role_ids)
            .await?;
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::{NewPermission, NewRole, NewUser};
    use crate::store::{Directory, MemoryStore};

    async fn permission(store: &MemoryStore, name: &str) -> i64 {
        let (resource, action) = name.split_once('.').unwrap();
        store
            .create_permission(NewPermission {
                name: name.into(),
                display_name: name.into(),
                description: None,
                resource: resource.into(),
                action: action.into(),
            })
            .await
            .unwrap()
            .id
    }

    async fn role(store: &MemoryStore, name: &str, active: bool, perms: &[i64]) -> i64 {
        let id = store
            .create_role(NewRole {
                name: name.into(),
                display_name: name.into(),
                description: None,
                is_active: active,
            })
            .await
            .unwrap()
            .id;
        store.assign_permissions_to_role(id, perms).await.unwrap();
        id
    }

    async fn user(store: &MemoryStore, name: &str) -> i64 {
        store
            .create_user(NewUser {
                username: name.into(),
                email: format!("{name}@example.com"),
                full_name: name.into(),
                is_active: true,
                password_hash: None,
            })
            .await
            .unwrap()
            .id
    }

    fn set(names: &[&str]) -> PermissionSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn union_over_roles_without_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let dashboard_read = permission(&store, "dashboard.read").await;
        let users_read = permission(&store, "users.read").await;
        let users_create = permission(&store, "users.create").await;

        let viewer = role(&store, "viewer", true, &[dashboard_read]).await;
        let user_manager = role(
            &store,
            "user_manager",
            true,
            &[users_read, users_create, dashboard_read],
        )
        .await;
        let alice = user(&store, "alice").await;

        let resolver = PermissionResolver::new(store.clone());

        store.assign_roles_to_user(alice, &[viewer], None).await.unwrap();
        assert_eq!(resolver.resolve(alice).await.unwrap(), set(&["dashboard.read"]));

        store
            .assign_roles_to_user(alice, &[viewer, user_manager], None)
            .await
            .unwrap();
        assert_eq!(
            resolver.resolve(alice).await.unwrap(),
            set(&["dashboard.read", "users.read", "users.create"])
        );
    }

    #[tokio::test]
    async fn inactive_roles_grant_nothing() {
        let store = Arc::new(MemoryStore::new());
        let reports = permission(&store, "reports.read").await;
        let retired = role(&store, "retired", false, &[reports]).await;
        let bob = user(&store, "bob").await;
        store.assign_roles_to_user(bob, &[retired], None).await.unwrap();

        let resolver = PermissionResolver::new(store);
        assert!(resolver.resolve(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_without_roles_has_empty_set() {
        let store = Arc::new(MemoryStore::new());
        let carol = user(&store, "carol").await;
        let resolver = PermissionResolver::new(store);
        assert!(resolver.resolve(carol).await.unwrap().is_empty());
    }
}
