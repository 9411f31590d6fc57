//! Login, refresh, logout and password-change protocol.
//!
//! The `Authenticator` ties the credential store, lockout policy, permission
//! resolver and token service together. Every security-relevant outcome is
//! reported to the audit sink; audit failures never affect the result.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::jwt::TokenService;
use super::lockout::LockoutPolicy;
use super::password::{hash_password, verify_password, verify_placeholder};
use super::permissions::PermissionResolver;
use super::{ADMIN_PERMISSION, AuthError};
use crate::audit::{AuditSink, record_quietly};
use crate::clock::{Clock, SystemClock};
use crate::models::audit::{AuditEntry, Severity};
use crate::models::auth::{AccessClaims, LoginOutcome, RefreshOutcome, UserRecord};
use crate::store::{CredentialStore, StoreError};

/// Compare-and-swap attempts for one failed-login counter update.
const LOCKOUT_WRITE_ATTEMPTS: usize = 3;

const AUTH_RESOURCE: &str = "auth";
const AUTH_MODULE: &str = "authentication";
const USER_MODULE: &str = "user_management";

/// Authentication entry point shared by every request.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditSink>,
    tokens: TokenService,
    lockout: LockoutPolicy,
    resolver: PermissionResolver,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
        tokens: TokenService,
    ) -> Self {
        Self {
            resolver: PermissionResolver::new(store.clone()),
            store,
            audit,
            tokens,
            lockout: LockoutPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_lockout_policy(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    /// Drive lockout windows and token lifetimes from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tokens = self.tokens.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn lockout_policy(&self) -> &LockoutPolicy {
        &self.lockout
    }

    async fn audit(&self, entry: AuditEntry) {
        record_quietly(self.audit.as_ref(), entry).await;
    }

    /// Authenticate by username or email.
    ///
    /// Unknown users and wrong passwords both fail with `InvalidCredentials`.
    /// A locked account is rejected before the password is looked at.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some(user) = self.store.find_user_by_username_or_email(identifier).await? else {
            verify_placeholder(password);
            info!(identifier, "login failed: unknown user");
            self.audit(
                AuditEntry::new("failed_login")
                    .actor(None, Some(identifier))
                    .resource(AUTH_RESOURCE)
                    .details("User not found")
                    .severity(Severity::Medium)
                    .module(AUTH_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        };

        let now = self.clock.now();
        if self.lockout.is_locked(&user.lockout, now) {
            info!(user_id = user.id, "login rejected: account locked");
            self.audit(
                AuditEntry::new("login_attempt_locked")
                    .actor(Some(user.id), Some(&user.username))
                    .resource(AUTH_RESOURCE)
                    .details("Login attempt on locked account")
                    .severity(Severity::High)
                    .module(AUTH_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::AccountLocked);
        }

        if !user.is_active {
            info!(user_id = user.id, "login rejected: account inactive");
            self.audit(
                AuditEntry::new("login_attempt_inactive")
                    .actor(Some(user.id), Some(&user.username))
                    .resource(AUTH_RESOURCE)
                    .details("Login attempt on inactive account")
                    .severity(Severity::Medium)
                    .module(AUTH_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::AccountInactive);
        }

        // No hash means nothing to verify; the counter is left alone.
        let Some(hash) = user.password_hash.as_deref() else {
            verify_placeholder(password);
            info!(user_id = user.id, "login failed: no password set");
            self.audit(
                AuditEntry::new("failed_login")
                    .actor(Some(user.id), Some(&user.username))
                    .resource(AUTH_RESOURCE)
                    .details("No password set")
                    .severity(Severity::Medium)
                    .module(AUTH_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, hash)? {
            self.record_failed_attempt(&user).await?;
            return Err(AuthError::InvalidCredentials);
        }

        // A lock taken by a concurrent failure since the read stands.
        if !self.store.record_login_success(user.id, now).await? {
            info!(user_id = user.id, "login rejected: account locked concurrently");
            self.audit(
                AuditEntry::new("login_attempt_locked")
                    .actor(Some(user.id), Some(&user.username))
                    .resource(AUTH_RESOURCE)
                    .details("Login attempt on locked account")
                    .severity(Severity::High)
                    .module(AUTH_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::AccountLocked);
        }

        let permissions = self.resolver.resolve(user.id).await?;
        let access_token = self
            .tokens
            .issue_access(user.id, &user.username, &permissions)?;
        let refresh_token = self.tokens.issue_refresh(user.id, &user.username)?;

        let mut profile = user.profile();
        profile.last_login = Some(now);

        info!(
            user_id = user.id,
            permissions = permissions.len(),
            "login succeeded"
        );
        self.audit(
            AuditEntry::new("user_login")
                .actor(Some(user.id), Some(&user.username))
                .resource(AUTH_RESOURCE)
                .details("Successful login")
                .module(AUTH_MODULE),
        )
        .await;

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            expires_in: self.tokens.access_ttl_secs(),
            profile,
            permissions,
        })
    }

    /// Increment the failed-login counter, locking the account at the limit.
    ///
    /// The write is a compare-and-swap on the counter; a lost race re-reads
    /// the row and tries again.
    async fn record_failed_attempt(&self, user: &UserRecord) -> Result<(), AuthError> {
        let mut current = user.lockout.clone();
        for _ in 0..LOCKOUT_WRITE_ATTEMPTS {
            let outcome = self.lockout.on_failure(&current, self.clock.now());
            let written = self
                .store
                .update_lockout_fields(user.id, Some(current.failed_attempts), &outcome.next)
                .await?;

            if written {
                let attempts = outcome.next.failed_attempts;
                info!(
                    user_id = user.id,
                    attempts,
                    locked = outcome.triggered_lock,
                    "login failed: invalid password"
                );
                let severity = if outcome.triggered_lock {
                    Severity::High
                } else {
                    Severity::Medium
                };
                self.audit(
                    AuditEntry::new("failed_login")
                        .actor(Some(user.id), Some(&user.username))
                        .resource(AUTH_RESOURCE)
                        .details(format!("Invalid password (attempt {attempts})"))
                        .severity(severity)
                        .module(AUTH_MODULE)
                        .failed(),
                )
                .await;
                if outcome.triggered_lock {
                    warn!(user_id = user.id, attempts, "account locked");
                    self.audit(
                        AuditEntry::new("account_locked")
                            .actor(Some(user.id), Some(&user.username))
                            .resource(AUTH_RESOURCE)
                            .details(format!(
                                "Account locked after {attempts} failed attempts"
                            ))
                            .severity(Severity::High)
                            .module(AUTH_MODULE),
                    )
                    .await;
                }
                return Ok(());
            }

            debug!(user_id = user.id, "lockout counter changed concurrently, retrying");
            match self.store.find_user_by_id(user.id).await? {
                Some(fresh) => current = fresh.lockout,
                None => return Ok(()),
            }
        }

        warn!(user_id = user.id, "gave up updating lockout counter");
        Err(AuthError::StoreUnavailable(StoreError::Conflict(
            "failed-login counter is contended".into(),
        )))
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Permissions are resolved fresh. The refresh token is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .ok_or(AuthError::InvalidToken)?;
        let permissions = self.resolver.resolve(claims.subject_id).await?;
        let access_token =
            self.tokens
                .issue_access(claims.subject_id, &claims.username, &permissions)?;
        debug!(user_id = claims.subject_id, "access token refreshed");
        Ok(RefreshOutcome {
            access_token,
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    /// Verify an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens
            .verify_access(token)
            .ok_or(AuthError::InvalidToken)
    }

    /// Record a logout. Issued tokens stay valid until they expire.
    pub async fn logout(&self, claims: &AccessClaims) {
        info!(user_id = claims.subject_id, "logout");
        self.audit(
            AuditEntry::new("user_logout")
                .actor(Some(claims.subject_id), Some(&claims.username))
                .resource(AUTH_RESOURCE)
                .details("User logged out")
                .module(AUTH_MODULE),
        )
        .await;
    }

    /// Self-service password change. Clears any lockout on success.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_new_password(new_password)?;
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let verified = match user.password_hash.as_deref() {
            Some(hash) => verify_password(current_password, hash)?,
            None => false,
        };
        if !verified {
            info!(user_id, "password change rejected");
            self.audit(
                AuditEntry::new("password_change_failed")
                    .actor(Some(user.id), Some(&user.username))
                    .resource(AUTH_RESOURCE)
                    .details("Current password did not verify")
                    .severity(Severity::Medium)
                    .module(AUTH_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        self.overwrite_credential(user.id, new_password).await?;
        info!(user_id, "password changed");
        self.audit(
            AuditEntry::new("password_changed")
                .actor(Some(user.id), Some(&user.username))
                .resource(AUTH_RESOURCE)
                .details("Password changed")
                .severity(Severity::Medium)
                .module(AUTH_MODULE),
        )
        .await;
        Ok(())
    }

    /// Set another user's password without knowing the current one.
    ///
    /// Requires `admin.all` in the caller's token.
    pub async fn admin_reset_password(
        &self,
        admin: &AccessClaims,
        target_user_id: i64,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if !admin.has_permission(ADMIN_PERMISSION) {
            warn!(
                user_id = admin.subject_id,
                target_user_id, "password reset denied"
            );
            self.audit(
                AuditEntry::new("admin_password_reset_denied")
                    .actor(Some(admin.subject_id), Some(&admin.username))
                    .resource("users")
                    .details(format!("Attempted password reset for user {target_user_id}"))
                    .severity(Severity::High)
                    .module(USER_MODULE)
                    .failed(),
            )
            .await;
            return Err(AuthError::PermissionDenied(format!(
                "{ADMIN_PERMISSION} required"
            )));
        }

        validate_new_password(new_password)?;
        let target = self
            .store
            .find_user_by_id(target_user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.overwrite_credential(target.id, new_password).await?;
        info!(
            user_id = admin.subject_id,
            target_user_id, "password reset by administrator"
        );
        self.audit(
            AuditEntry::new("admin_password_reset")
                .actor(Some(admin.subject_id), Some(&admin.username))
                .resource("users")
                .details(format!("Password reset for user {}", target.username))
                .severity(Severity::High)
                .module(USER_MODULE),
        )
        .await;
        Ok(())
    }

    async fn overwrite_credential(&self, user_id: i64, new_password: &str) -> Result<(), AuthError> {
        let hash = hash_password(new_password)?;
        self.store.set_credential_hash(user_id, &hash).await?;
        self.store
            .update_lockout_fields(user_id, None, &self.lockout.on_success())
            .await?;
        Ok(())
    }
}

fn validate_new_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::Validation("New password must not be empty".into()));
    }
    Ok(())
}
