//! Integration tests: role, permission and user management endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::{ALICE_PASSWORD, TestApp};

async fn create_role(t: &TestApp, token: &str, name: &str, active: bool) -> i64 {
    let (status, body) = t
        .call(
            "POST",
            "/api/roles",
            Some(token),
            Some(json!({ "name": name, "display_name": name, "is_active": active })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_i64().unwrap()
}

async fn create_permission(t: &TestApp, token: &str, name: &str) -> i64 {
    let (resource, action) = name.split_once('.').unwrap();
    let (status, body) = t
        .call(
            "POST",
            "/api/permissions",
            Some(token),
            Some(json!({
                "name": name,
                "display_name": name,
                "resource": resource,
                "action": action,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_i64().unwrap()
}

fn names(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn management_requires_permissions() {
    let t = TestApp::new().await;
    let alice = t.alice_token().await;

    let (status, body) = t.call("GET", "/api/roles", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "roles.read required");

    let (status, _) = t.call("GET", "/api/permissions", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(
            "POST",
            "/api/check-permission",
            Some(&alice),
            Some(json!({ "user_id": t.alice_id, "resource": "roles", "action": "read" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn role_permission_assignment_flows_into_tokens() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let read = create_permission(&t, &admin, "reports.read").await;
    let export = create_permission(&t, &admin, "reports.export").await;
    let analyst = create_role(&t, &admin, "analyst", true).await;

    let (status, _) = t
        .call(
            "POST",
            &format!("/api/roles/{analyst}/permissions"),
            Some(&admin),
            Some(json!({ "permission_ids": [read, export] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .call(
            "POST",
            &format!("/api/users/{}/roles", t.alice_id),
            Some(&admin),
            Some(json!({ "role_ids": [analyst] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, roles) = t
        .call(
            "GET",
            &format!("/api/users/{}/roles", t.alice_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&roles), vec!["analyst"]);

    let (status, check) = t
        .call(
            "POST",
            "/api/check-permission",
            Some(&admin),
            Some(json!({ "user_id": t.alice_id, "resource": "reports", "action": "export" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["has_permission"], true);
    assert_eq!(check["roles"], json!(["analyst"]));
    assert_eq!(check["permissions"], json!(["reports.export"]));

    let (_, login) = t.login("alice", ALICE_PASSWORD).await;
    assert_eq!(
        login["permissions"],
        json!(["reports.export", "reports.read"])
    );

    let actions = t.audit.actions();
    for expected in [
        "create_permission",
        "create_role",
        "assign_permissions",
        "assign_roles",
    ] {
        assert!(actions.contains(&expected.to_string()), "missing {expected}");
    }
}

#[tokio::test]
async fn assignment_replaces_and_records_previous_ids() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let first = create_role(&t, &admin, "first", true).await;
    let second = create_role(&t, &admin, "second", true).await;

    for role in [first, second] {
        let (status, _) = t
            .call(
                "POST",
                &format!("/api/users/{}/roles", t.alice_id),
                Some(&admin),
                Some(json!({ "role_ids": [role] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let last = t
        .audit
        .entries()
        .into_iter()
        .filter(|e| e.action == "assign_roles")
        .last()
        .unwrap();
    assert_eq!(last.before_data.as_deref(), Some(format!("[{first}]").as_str()));
    assert_eq!(last.after_data.as_deref(), Some(format!("[{second}]").as_str()));
    assert_eq!(last.actor_user_id, Some(t.admin_id));
}

#[tokio::test]
async fn list_roles_filters_inactive_on_request() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    create_role(&t, &admin, "retired", false).await;

    let (_, all) = t.call("GET", "/api/roles", Some(&admin), None).await;
    assert!(names(&all).contains(&"retired".to_string()));

    let (status, active) = t
        .call("GET", "/api/roles?active_only=true", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!names(&active).contains(&"retired".to_string()));
    assert!(names(&active).contains(&"admin".to_string()));
}

#[tokio::test]
async fn duplicates_and_unknown_ids_are_rejected() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, body) = t
        .call(
            "POST",
            "/api/roles",
            Some(&admin),
            Some(json!({ "name": "admin", "display_name": "Again" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, _) = t
        .call(
            "POST",
            "/api/roles/9999/permissions",
            Some(&admin),
            Some(json!({ "permission_ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .call(
            "POST",
            &format!("/api/users/{}/roles", t.alice_id),
            Some(&admin),
            Some(json!({ "role_ids": [9999] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .call("GET", "/api/users/9999/roles", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_user_can_log_in() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, body) = t
        .call(
            "POST",
            "/api/users",
            Some(&admin),
            Some(json!({
                "username": "carol",
                "email": "carol@example.com",
                "full_name": "Carol",
                "password": "carol-password",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["username"], "carol");
    assert_eq!(body["is_active"], true);

    let (status, login) = t.login("carol@example.com", "carol-password").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["permissions"], json!([]));

    let (status, _) = t
        .call(
            "POST",
            "/api/users",
            Some(&admin),
            Some(json!({
                "username": "carol",
                "email": "other@example.com",
                "full_name": "Carol Again",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_listing_pages_and_filters() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let alice = t.alice_token().await;

    let (status, _) = t.call("GET", "/api/users", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, all) = t.call("GET", "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let usernames: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames, vec!["alice", "admin"]);
    assert!(all[0].get("password_hash").is_none());

    let (_, page) = t
        .call("GET", "/api/users?skip=1&limit=1", Some(&admin), None)
        .await;
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["username"], "admin");

    t.call(
        "PUT",
        &format!("/api/users/{}", t.alice_id),
        Some(&admin),
        Some(json!({ "is_active": false })),
    )
    .await;
    let (_, active) = t
        .call("GET", "/api/users?active_only=true", Some(&admin), None)
        .await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["username"], "admin");

    for query in ["limit=0", "limit=1001", "skip=-1"] {
        let (status, body) = t
            .call("GET", &format!("/api/users?{query}"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn user_detail_includes_roles_and_permissions() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let (status, body) = t
        .call("GET", &format!("/api/users/{}", t.admin_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "admin");
    assert_eq!(names(&body["roles"]), vec!["admin"]);
    assert!(
        body["permissions"]
            .as_array()
            .unwrap()
            .contains(&json!("users.delete"))
    );

    let (status, _) = t.call("GET", "/api/users/9999", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_update_changes_fields_and_roles() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let analyst = create_role(&t, &admin, "analyst", true).await;

    let (status, body) = t
        .call(
            "PUT",
            &format!("/api/users/{}", t.alice_id),
            Some(&admin),
            Some(json!({ "full_name": "Alice Liddell", "role_ids": [analyst] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["full_name"], "Alice Liddell");
    assert_eq!(body["username"], "alice");
    assert_eq!(names(&body["roles"]), vec!["analyst"]);

    let update = t
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == "update_user")
        .unwrap();
    assert_eq!(update.actor_user_id, Some(t.admin_id));
    assert!(update.before_data.unwrap().contains("\"full_name\":\"alice\""));
    assert!(update.after_data.unwrap().contains("Alice Liddell"));
    assert!(t.audit.actions().contains(&"assign_roles".to_string()));

    let (status, body) = t
        .call(
            "PUT",
            &format!("/api/users/{}", t.alice_id),
            Some(&admin),
            Some(json!({ "email": "admin@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, _) = t
        .call(
            "PUT",
            &format!("/api/users/{}", t.alice_id),
            Some(&admin),
            Some(json!({ "username": "  " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .call(
            "PUT",
            "/api/users/9999",
            Some(&admin),
            Some(json!({ "full_name": "Nobody" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_user_can_no_longer_log_in() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;

    let alice = t.alice_token().await;
    let (status, _) = t
        .call("DELETE", &format!("/api/users/{}", t.admin_id), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .call("DELETE", &format!("/api/users/{}", t.alice_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "User alice deleted successfully");

    let (status, _) = t.login("alice", ALICE_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .call("DELETE", &format!("/api/users/{}", t.alice_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let deleted = t
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == "delete_user")
        .unwrap();
    assert!(deleted.before_data.unwrap().contains("\"username\":\"alice\""));
}

#[tokio::test]
async fn deactivating_a_role_withdraws_its_permissions() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let read = create_permission(&t, &admin, "reports.read").await;
    let analyst = create_role(&t, &admin, "analyst", true).await;
    t.call(
        "POST",
        &format!("/api/roles/{analyst}/permissions"),
        Some(&admin),
        Some(json!({ "permission_ids": [read] })),
    )
    .await;
    t.call(
        "POST",
        &format!("/api/users/{}/roles", t.alice_id),
        Some(&admin),
        Some(json!({ "role_ids": [analyst] })),
    )
    .await;

    let (_, login) = t.login("alice", ALICE_PASSWORD).await;
    assert_eq!(login["permissions"], json!(["reports.read"]));

    let (status, body) = t
        .call(
            "PUT",
            &format!("/api/roles/{analyst}"),
            Some(&admin),
            Some(json!({ "is_active": false, "description": "Retired" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["is_active"], false);
    assert_eq!(body["description"], "Retired");
    assert_eq!(names(&body["permissions"]), vec!["reports.read"]);

    let (_, login) = t.login("alice", ALICE_PASSWORD).await;
    assert_eq!(login["permissions"], json!([]));

    let update = t
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == "update_role")
        .unwrap();
    assert!(update.before_data.unwrap().contains("\"is_active\":true"));
    assert!(update.after_data.unwrap().contains("\"is_active\":false"));
}

#[tokio::test]
async fn role_update_validates_input() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let analyst = create_role(&t, &admin, "analyst", true).await;

    let (status, body) = t
        .call("PUT", &format!("/api/roles/{analyst}"), Some(&admin), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No fields to update");

    let (status, body) = t
        .call(
            "PUT",
            &format!("/api/roles/{analyst}"),
            Some(&admin),
            Some(json!({ "name": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");

    let (status, _) = t
        .call(
            "PUT",
            "/api/roles/9999",
            Some(&admin),
            Some(json!({ "display_name": "Ghost" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_role_disappears_from_users() {
    let t = TestApp::new().await;
    let admin = t.admin_token().await;
    let analyst = create_role(&t, &admin, "analyst", true).await;
    t.call(
        "POST",
        &format!("/api/users/{}/roles", t.alice_id),
        Some(&admin),
        Some(json!({ "role_ids": [analyst] })),
    )
    .await;

    let (status, role) = t
        .call("GET", &format!("/api/roles/{analyst}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(role["name"], "analyst");

    let (status, body) = t
        .call("DELETE", &format!("/api/roles/{analyst}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Role analyst deleted successfully");

    let (status, _) = t
        .call("GET", &format!("/api/roles/{analyst}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, roles) = t
        .call(
            "GET",
            &format!("/api/users/{}/roles", t.alice_id),
            Some(&admin),
            None,
        )
        .await;
    assert!(names(&roles).is_empty());

    let deleted = t
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == "delete_role")
        .unwrap();
    assert_eq!(deleted.severity, warden_core::models::audit::Severity::High);
}
