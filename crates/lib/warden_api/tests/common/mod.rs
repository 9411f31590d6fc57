//! Shared fixture: router over an in-memory store with an administrator
//! and an unprivileged user.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;
use warden_api::{AppState, config::ApiConfig};
use warden_core::audit::MemoryAuditSink;
use warden_core::auth::password::hash_password;
use warden_core::models::rbac::{NewPermission, NewRole, NewUser};
use warden_core::store::{Directory, MemoryStore};

pub const ADMIN_PASSWORD: &str = "admin-password";
pub const ALICE_PASSWORD: &str = "alice-password";

pub const MANAGEMENT_PERMISSIONS: &[&str] = &[
    "admin.all",
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

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub admin_id: i64,
    pub alice_id: i64,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());

        let mut permission_ids = Vec::new();
        for name in MANAGEMENT_PERMISSIONS {
            let (resource, action) = name.split_once('.').unwrap();
            let p = store
                .create_permission(NewPermission {
                    name: name.to_string(),
                    display_name: name.to_string(),
                    description: None,
                    resource: resource.into(),
                    action: action.into(),
                })
                .await
                .unwrap();
            permission_ids.push(p.id);
        }
        let admin_role = store
            .create_role(NewRole {
                name: "admin".into(),
                display_name: "Administrator".into(),
                description: None,
                is_active: true,
            })
            .await
            .unwrap();
        store
            .assign_permissions_to_role(admin_role.id, &permission_ids)
            .await
            .unwrap();

        let admin_id = create_user(&store, "admin", Some(ADMIN_PASSWORD)).await;
        store
            .assign_roles_to_user(admin_id, &[admin_role.id], None)
            .await
            .unwrap();
        let alice_id = create_user(&store, "alice", Some(ALICE_PASSWORD)).await;

        let state = AppState::new(
            store.clone(),
            audit.clone(),
            ApiConfig::with_secret("integration-test-secret"),
        );
        Self {
            app: warden_api::router(state),
            store,
            audit,
            admin_id,
            alice_id,
        }
    }

    /// Send one request and decode the JSON body (`Null` when empty).
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({ "username": username, "password": password })),
        )
        .await
    }

    /// Log in and return the access token, panicking on failure.
    pub async fn token(&self, username: &str, password: &str) -> String {
        let (status, body) = self.login(username, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.token("admin", ADMIN_PASSWORD).await
    }

    pub async fn alice_token(&self) -> String {
        self.token("alice", ALICE_PASSWORD).await
    }
}

pub async fn create_user(store: &MemoryStore, name: &str, password: Option<&str>) -> i64 {
    store
        .create_user(NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            full_name: name.into(),
            is_active: true,
            password_hash: password.map(|p| hash_password(p).unwrap()),
        })
        .await
        .unwrap()
        .id
}
