//! Authentication request handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AdminResetPasswordRequest, ChangePasswordRequest, LoginRequest, MeResponse, MessageResponse,
    RefreshRequest, RefreshResponse, TokenResponse,
};
use crate::services::auth;

/// `POST /api/auth/login`: authenticate with username or email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::login(&state, &body.username, &body.password).await?;
    Ok(Json(resp))
}

/// `POST /api/auth/refresh`: exchange a refresh token for a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let resp = auth::refresh(&state, &body.refresh_token).await?;
    Ok(Json(resp))
}

/// `POST /api/auth/logout`: record the logout. Tokens are not revoked.
pub async fn logout_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> Json<MessageResponse> {
    state.auth.logout(&user.0).await;
    Json(MessageResponse::new("Logged out successfully"))
}

/// `GET /api/auth/me`: the authenticated user.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<MeResponse>> {
    let resp = auth::me(&state, &user.0).await?;
    Ok(Json(resp))
}

/// `POST /api/auth/change-password`: change the caller's own password.
pub async fn change_password_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .change_password(user.0.subject_id, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// `POST /api/auth/admin/reset-password`: set another user's password.
pub async fn admin_reset_password_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<AdminResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .admin_reset_password(&user.0, body.user_id, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new(format!(
        "Password reset successfully for user {}",
        body.user_id
    ))))
}
