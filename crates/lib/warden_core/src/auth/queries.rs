//! Auth-related database queries.
//!
//! All values are bound as parameters; nothing is interpolated into SQL text.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::auth::{LockoutState, UserRecord};
use crate::store::StoreError;

pub(crate) type UserRow = (
    i64,
    String,
    String,
    String,
    bool,
    Option<String>,
    i32,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

pub(crate) const USER_COLUMNS: &str = "id, username, email, full_name, is_active, password_hash, \
     failed_login_attempts, account_locked_until, last_login, created_at";

pub(crate) fn user_from_row(row: UserRow) -> UserRecord {
    let (
        id,
        username,
        email,
        full_name,
        is_active,
        password_hash,
        failed_attempts,
        locked_until,
        last_login,
        created_at,
    ) = row;
    UserRecord {
        id,
        username,
        email,
        full_name,
        is_active,
        password_hash,
        lockout: LockoutState {
            failed_attempts,
            locked_until,
        },
        last_login,
        created_at,
    }
}

/// Fetch a user by username or email, preferring the username match.
pub async fn find_user_by_username_or_email(
    pool: &PgPool,
    identifier: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1 \
         ORDER BY (username = $1) DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(identifier)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(user_from_row))
}

/// Fetch a user by ID.
pub async fn find_user_by_id(pool: &PgPool, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(user_from_row))
}

/// Write lockout fields, optionally as a compare-and-swap on the counter.
pub async fn update_lockout_fields(
    pool: &PgPool,
    user_id: i64,
    expected_failed_attempts: Option<i32>,
    next: &LockoutState,
) -> Result<bool, StoreError> {
    let result = match expected_failed_attempts {
        Some(expected) => {
            sqlx::query(
                "UPDATE users SET failed_login_attempts = $2, account_locked_until = $3 \
                 WHERE id = $1 AND failed_login_attempts = $4",
            )
            .bind(user_id)
            .bind(next.failed_attempts)
            .bind(next.locked_until)
            .bind(expected)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE users SET failed_login_attempts = $2, account_locked_until = $3 \
                 WHERE id = $1",
            )
            .bind(user_id)
            .bind(next.failed_attempts)
            .bind(next.locked_until)
            .execute(pool)
            .await?
        }
    };
    Ok(result.rows_affected() == 1)
}

/// Stamp the last successful login.
pub async fn update_last_login(
    pool: &PgPool,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
        .bind(user_id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reset the lockout fields and stamp `last_login`, unless a lock is still
/// in force at `at`.
pub async fn record_login_success(
    pool: &PgPool,
    user_id: i64,
    at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE users \
         SET failed_login_attempts = 0, account_locked_until = NULL, last_login = $2 \
         WHERE id = $1 AND (account_locked_until IS NULL OR account_locked_until <= $2)",
    )
    .bind(user_id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Users ordered newest first.
pub async fn list_users(
    pool: &PgPool,
    active_only: bool,
    offset: i64,
    limit: i64,
) -> Result<Vec<UserRecord>, StoreError> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE is_active OR NOT $1 \
         ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
    );
    let rows = sqlx::query_as::<_, UserRow>(&sql)
        .bind(active_only)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(user_from_row).collect())
}

/// Overwrite a user's password hash.
pub async fn set_credential_hash(pool: &PgPool, user_id: i64, hash: &str) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(user_id)
        .bind(hash)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("user {user_id}")));
    }
    Ok(())
}

/// IDs of the user's active roles.
pub async fn list_active_role_ids_for_user(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<i64>, StoreError> {
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT r.id FROM roles r \
         JOIN user_roles ur ON ur.role_id = r.id \
         WHERE ur.user_id = $1 AND r.is_active",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Distinct permission names granted by the given roles.
pub async fn list_permission_names_for_roles(
    pool: &PgPool,
    role_ids: &[i64],
) -> Result<Vec<String>, StoreError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT p.name FROM permissions p \
         JOIN role_permissions rp ON rp.permission_id = p.id \
         WHERE rp.role_id = ANY($1)",
    )
    .bind(role_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
