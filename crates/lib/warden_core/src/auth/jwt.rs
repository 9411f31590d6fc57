//! JWT token issuance and verification.
//!
//! A `TokenService` holds one signing secret for the lifetime of the process.
//! Access tokens carry a permission snapshot; refresh tokens carry identity
//! only. Every verification failure collapses to `None`.
//!
//! Issue and expiry times come from the service's `Clock`, so simulated time
//! moves tokens and lockouts together.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::AuthError;
use crate::clock::{Clock, SystemClock};
use crate::models::auth::{AccessClaims, PermissionSet, RefreshClaims, TokenClaims, TokenType};

/// Access token lifetime: 30 minutes.
pub const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 30;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Token lifetimes and signing algorithm.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub algorithm: Algorithm,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_EXPIRY_DAYS),
            algorithm: Algorithm::HS256,
        }
    }
}

/// Issues and verifies signed, time-bounded tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], config: TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        self.config.access_ttl.num_seconds()
    }

    /// Issue an access token with the configured lifetime.
    pub fn issue_access(
        &self,
        subject_id: i64,
        username: &str,
        permissions: &PermissionSet,
    ) -> Result<String, AuthError> {
        self.issue_access_with_ttl(subject_id, username, permissions, self.config.access_ttl)
    }

    pub fn issue_access_with_ttl(
        &self,
        subject_id: i64,
        username: &str,
        permissions: &PermissionSet,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let permissions = permissions.iter().cloned().collect();
        self.sign(subject_id, username, Some(permissions), ttl, TokenType::Access)
    }

    /// Issue a refresh token with the configured lifetime.
    pub fn issue_refresh(&self, subject_id: i64, username: &str) -> Result<String, AuthError> {
        self.issue_refresh_with_ttl(subject_id, username, self.config.refresh_ttl)
    }

    pub fn issue_refresh_with_ttl(
        &self,
        subject_id: i64,
        username: &str,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        self.sign(subject_id, username, None, ttl, TokenType::Refresh)
    }

    fn sign(
        &self,
        subject_id: i64,
        username: &str,
        permissions: Option<Vec<String>>,
        ttl: Duration,
        token_type: TokenType,
    ) -> Result<String, AuthError> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Internal(format!("token lifetime {ttl} out of range")))?;
        let claims = TokenClaims {
            sub: subject_id.to_string(),
            username: username.to_string(),
            permissions,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            token_type,
        };
        encode(
            &Header::new(self.config.algorithm),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature, expiry and discriminator, returning the raw claims.
    pub fn verify(&self, token: &str, expected: TokenType) -> Option<TokenClaims> {
        let mut validation = Validation::new(self.config.algorithm);
        // Expiry is checked below against the service clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = match decode::<TokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(token = %token_fingerprint(token), error = %e, "token rejected");
                return None;
            }
        };

        if claims.exp <= self.clock.now().timestamp() {
            debug!(token = %token_fingerprint(token), "token expired");
            return None;
        }

        if claims.token_type != expected {
            debug!(
                token = %token_fingerprint(token),
                expected = ?expected,
                actual = ?claims.token_type,
                "token type mismatch"
            );
            return None;
        }
        Some(claims)
    }

    /// Verify an access token and parse its identity and permission snapshot.
    pub fn verify_access(&self, token: &str) -> Option<AccessClaims> {
        let claims = self.verify(token, TokenType::Access)?;
        let subject_id = claims.sub.parse::<i64>().ok()?;
        let permissions = claims.permissions?.into_iter().collect();
        Some(AccessClaims {
            subject_id,
            username: claims.username,
            permissions,
        })
    }

    /// Verify a refresh token and parse its identity.
    pub fn verify_refresh(&self, token: &str) -> Option<RefreshClaims> {
        let claims = self.verify(token, TokenType::Refresh)?;
        let subject_id = claims.sub.parse::<i64>().ok()?;
        Some(RefreshClaims {
            subject_id,
            username: claims.username,
        })
    }
}

/// Short SHA-256 prefix of a token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{digest:x}")[..12].to_string()
}

/// Environment variables consulted for the signing secret, in order.
const SECRET_ENV_VARS: [&str; 2] = ["JWT_SECRET", "AUTH_SECRET"];

const GENERATED_SECRET_LEN: usize = 64;

/// Resolve the JWT secret: `JWT_SECRET`, then `AUTH_SECRET`, then the
/// persisted secret file (created on first use).
pub fn resolve_jwt_secret() -> String {
    let from_env = SECRET_ENV_VARS.iter().find_map(|key| {
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    });
    match from_env {
        Some(secret) => secret,
        None => load_or_create_secret(&jwt_secret_path()),
    }
}

/// Read the secret stored at `path`, generating and storing a new one when
/// the file is missing or empty.
pub fn load_or_create_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect();
    match persist_secret(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %path.display(),
            "generated JWT secret could not be saved; tokens will not survive a restart: {e}"
        ),
    }
    secret
}

fn persist_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warden")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::clock::ManualClock;

    fn service(secret: &str) -> TokenService {
        TokenService::new(secret.as_bytes(), TokenConfig::default())
    }

    fn perms(names: &[&str]) -> PermissionSet {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn access_token_roundtrip() {
        let svc = service("test-secret");
        let granted = perms(&["dashboard.read", "users.read"]);
        let token = svc.issue_access(42, "alice", &granted).unwrap();

        let claims = svc.verify_access(&token).expect("valid token");
        assert_eq!(claims.subject_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.permissions, granted);
    }

    #[test]
    fn access_token_roundtrip_with_empty_permissions() {
        let svc = service("test-secret");
        let token = svc.issue_access(1, "bob", &PermissionSet::new()).unwrap();
        let claims = svc.verify_access(&token).expect("valid token");
        assert!(claims.permissions.is_empty());
    }

    #[test]
    fn refresh_token_carries_no_permissions() {
        let svc = service("test-secret");
        let token = svc.issue_refresh(7, "carol").unwrap();
        let claims = svc.verify(&token, TokenType::Refresh).expect("valid token");
        assert!(claims.permissions.is_none());
        assert_eq!(claims.sub, "7");
    }

    #[test]
    fn token_type_must_match() {
        let svc = service("test-secret");
        let access = svc.issue_access(1, "alice", &perms(&["a.b"])).unwrap();
        let refresh = svc.issue_refresh(1, "alice").unwrap();

        assert!(svc.verify_refresh(&access).is_none());
        assert!(svc.verify_access(&refresh).is_none());
        assert!(svc.verify(&access, TokenType::Access).is_some());
        assert!(svc.verify(&refresh, TokenType::Refresh).is_some());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let issuer = service("secret-one");
        let verifier = service("secret-two");
        let token = issuer.issue_access(1, "alice", &PermissionSet::new()).unwrap();
        assert!(verifier.verify_access(&token).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = service("test-secret");
        let token = svc
            .issue_access_with_ttl(1, "alice", &PermissionSet::new(), Duration::seconds(-5))
            .unwrap();
        assert!(svc.verify_access(&token).is_none());
    }

    #[test]
    fn expiry_follows_the_service_clock() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = service("test-secret").with_clock(clock.clone());
        let token = svc.issue_access(1, "alice", &PermissionSet::new()).unwrap();

        clock.advance(Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES - 1));
        assert!(svc.verify_access(&token).is_some());
        clock.advance(Duration::minutes(1));
        assert!(svc.verify_access(&token).is_none());
    }

    #[test]
    fn issue_time_comes_from_the_service_clock() {
        let start = Utc::now() - Duration::days(3);
        let svc = service("test-secret").with_clock(Arc::new(ManualClock::new(start)));
        let token = svc.issue_refresh(1, "alice").unwrap();
        let claims = svc.verify(&token, TokenType::Refresh).unwrap();
        assert_eq!(claims.iat, start.timestamp());
        assert_eq!(
            claims.exp,
            (start + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS)).timestamp()
        );
    }

    #[test]
    fn unrepresentable_lifetime_is_an_error() {
        let svc = service("test-secret");
        let result = svc.issue_refresh_with_ttl(1, "alice", Duration::days(100_000_000));
        assert!(matches!(result, Err(AuthError::Internal(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        let svc = service("test-secret");
        assert!(svc.verify_access("not.a.jwt").is_none());
        assert!(svc.verify_access("").is_none());
    }

    #[test]
    fn non_integer_subject_is_rejected() {
        let secret = b"test-secret";
        let svc = TokenService::new(secret, TokenConfig::default());
        let claims = TokenClaims {
            sub: "not-a-number".into(),
            username: "mallory".into(),
            permissions: Some(vec!["admin.all".into()]),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            token_type: TokenType::Access,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        assert!(svc.verify(&token, TokenType::Access).is_some());
        assert!(svc.verify_access(&token).is_none());
    }

    #[test]
    fn access_token_without_permissions_is_rejected() {
        let secret = b"test-secret";
        let svc = TokenService::new(secret, TokenConfig::default());
        let claims = TokenClaims {
            sub: "3".into(),
            username: "dave".into(),
            permissions: None,
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            token_type: TokenType::Access,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        assert!(svc.verify_access(&token).is_none());
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        let a = token_fingerprint("abc");
        assert_eq!(a.len(), 12);
        assert_eq!(a, token_fingerprint("abc"));
        assert_ne!(a, token_fingerprint("abd"));
    }

    #[test]
    fn secret_file_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jwt-secret");

        let first = load_or_create_secret(&path);
        assert_eq!(first.len(), GENERATED_SECRET_LEN);
        assert!(path.exists());
        assert_eq!(load_or_create_secret(&path), first);
    }

    #[test]
    fn existing_secret_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt-secret");
        std::fs::write(&path, "  from-disk\n").unwrap();
        assert_eq!(load_or_create_secret(&path), "from-disk");
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt-secret");
        load_or_create_secret(&path);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
