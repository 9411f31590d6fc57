//! Audit trail sink.
//!
//! Writes are fire-and-forget from the caller's point of view: a failed write
//! is logged and dropped, never propagated into the operation being audited.

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::warn;

use crate::models::audit::AuditEntry;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Audit sink error: {0}")]
    Internal(String),
}

/// Write-only destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Record `entry`, logging and discarding any failure.
pub async fn record_quietly(sink: &dyn AuditSink, entry: AuditEntry) {
    let action = entry.action.clone();
    if let Err(e) = sink.record(entry).await {
        warn!(action = %action, "failed to record audit log: {e}");
    }
}

/// Audit sink backed by the `audit_logs` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        insert_audit_log(&self.pool, &entry).await
    }
}

/// Insert one audit row.
pub async fn insert_audit_log(pool: &PgPool, entry: &AuditEntry) -> Result<(), AuditError> {
    sqlx::query(
        "INSERT INTO audit_logs \
         (user_id, username, action, resource, details, severity, status, module, before_data, after_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(entry.actor_user_id)
    .bind(entry.actor_username.as_deref())
    .bind(&entry.action)
    .bind(entry.resource.as_deref())
    .bind(entry.details.as_deref())
    .bind(entry.severity.as_str())
    .bind(entry.status.as_str())
    .bind(entry.module.as_deref())
    .bind(entry.before_data.as_deref())
    .bind(entry.after_data.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}

/// In-memory audit sink. Keeps every entry in insertion order.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded actions, in order.
    pub fn actions(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.action).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Internal("audit buffer poisoned".into()))?
            .push(entry);
        Ok(())
    }
}
