//! Password hashing via bcrypt.
//!
//! Hashes are self-describing (`$2b$<cost>$<salt><digest>`), so verification
//! needs nothing but the stored string. `bcrypt::verify` compares digests in
//! constant time.

use std::sync::LazyLock;

use super::AuthError;

/// bcrypt cost factor for new hashes.
const BCRYPT_COST: u32 = 10;

/// bcrypt only reads this many bytes of input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash `password` with a fresh random salt.
///
/// Passwords longer than bcrypt's input limit are rejected rather than
/// silently truncated.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::Validation(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AuthError::Internal(format!("bcrypt: {e}")))
}

/// Check `password` against a stored hash. A malformed hash is an error, not
/// a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt: {e}")))
}

/// Stand-in hash for accounts that have no real one to check.
static PLACEHOLDER_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| bcrypt::hash("placeholder credential", BCRYPT_COST).ok());

/// Spend one bcrypt verification on a hash no account owns, so a login for a
/// missing user or credential takes as long as a wrong password.
pub fn verify_placeholder(password: &str) {
    if let Some(hash) = PLACEHOLDER_HASH.as_deref() {
        let _ = bcrypt::verify(password, hash);
    }
}
