//! Authentication service: response assembly over `warden_core::auth`.

use warden_core::models::auth::AccessClaims;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{MeResponse, RefreshResponse, TokenResponse, permission_list};
use crate::services::directory;

const TOKEN_TYPE: &str = "bearer";

/// Authenticate with username-or-email + password.
pub async fn login(state: &AppState, identifier: &str, password: &str) -> AppResult<TokenResponse> {
    if identifier.trim().is_empty() {
        return Err(AppError::Validation("Username is required".into()));
    }
    let outcome = state.auth.login(identifier.trim(), password).await?;
    Ok(TokenResponse {
        access_token: outcome.access_token,
        refresh_token: outcome.refresh_token,
        token_type: TOKEN_TYPE.into(),
        expires_in: outcome.expires_in,
        user: outcome.profile,
        permissions: permission_list(&outcome.permissions),
    })
}

/// Exchange a refresh token for a new access token.
pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<RefreshResponse> {
    let outcome = state.auth.refresh(refresh_token).await?;
    Ok(RefreshResponse {
        access_token: outcome.access_token,
        token_type: TOKEN_TYPE.into(),
        expires_in: outcome.expires_in,
    })
}

/// Profile, roles and freshly resolved permissions of the caller.
pub async fn me(state: &AppState, claims: &AccessClaims) -> AppResult<MeResponse> {
    directory::user_detail(state, claims.subject_id).await
}
