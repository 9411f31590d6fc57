//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use warden_core::audit::AuditSink;
use warden_core::auth::authenticator::Authenticator;
use warden_core::auth::jwt::TokenService;
use warden_core::store::{CredentialStore, Directory};

use crate::config::ApiConfig;
use crate::handlers::{auth, health, permissions, roles, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Management surface over users, roles and permissions.
    pub directory: Arc<dyn Directory>,
    pub auth: Arc<Authenticator>,
    pub audit: Arc<dyn AuditSink>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the authenticator and directory over one store.
    pub fn new<S>(store: Arc<S>, audit: Arc<dyn AuditSink>, config: ApiConfig) -> Self
    where
        S: CredentialStore + Directory + 'static,
    {
        let tokens = TokenService::new(config.jwt_secret.as_bytes(), config.token_config());
        let authenticator = Authenticator::new(store.clone(), audit.clone(), tokens)
            .with_lockout_policy(config.lockout_policy());
        Self {
            directory: store,
            auth: Arc::new(authenticator),
            audit,
            config,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));

    // Protected routes (require a valid access token)
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(
            routes::POST_AUTH_CHANGE_PASSWORD,
            post(auth::change_password_handler),
        )
        .route(
            routes::POST_AUTH_ADMIN_RESET_PASSWORD,
            post(auth::admin_reset_password_handler),
        )
        .route(
            routes::ROLES,
            get(roles::list_roles_handler).post(roles::create_role_handler),
        )
        .route(
            routes::ROLE,
            get(roles::get_role_handler)
                .put(roles::update_role_handler)
                .delete(roles::delete_role_handler),
        )
        .route(
            routes::POST_ROLE_PERMISSIONS,
            post(roles::assign_permissions_handler),
        )
        .route(
            routes::PERMISSIONS,
            get(permissions::list_permissions_handler)
                .post(permissions::create_permission_handler),
        )
        .route(
            routes::POST_CHECK_PERMISSION,
            post(permissions::check_permission_handler),
        )
        .route(
            routes::USERS,
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            routes::USER,
            get(users::get_user_handler)
                .put(users::update_user_handler)
                .delete(users::delete_user_handler),
        )
        .route(
            routes::USER_ROLES,
            get(users::list_user_roles_handler).post(users::assign_roles_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
