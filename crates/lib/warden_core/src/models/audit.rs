//! Audit trail models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How much attention an audit entry deserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
        }
    }
}

/// One administrative or authentication event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub actor_user_id: Option<i64>,
    pub actor_username: Option<String>,
    pub action: String,
    pub resource: Option<String>,
    pub details: Option<String>,
    pub severity: Severity,
    pub status: AuditStatus,
    pub module: Option<String>,
    pub before_data: Option<String>,
    pub after_data: Option<String>,
}

impl AuditEntry {
    /// Start an entry for `action` with `info` severity and `success` status.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            actor_user_id: None,
            actor_username: None,
            action: action.into(),
            resource: None,
            details: None,
            severity: Severity::Info,
            status: AuditStatus::Success,
            module: None,
            before_data: None,
            after_data: None,
        }
    }

    pub fn actor(mut self, user_id: Option<i64>, username: Option<&str>) -> Self {
        self.actor_user_id = user_id;
        self.actor_username = username.map(str::to_string);
        self
    }

    pub fn resource(mut self, resource: &str) -> Self {
        self.resource = Some(resource.to_string());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn failed(mut self) -> Self {
        self.status = AuditStatus::Failed;
        self
    }

    pub fn module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    /// State of a record that no longer exists afterwards.
    pub fn before(mut self, before: impl Into<String>) -> Self {
        self.before_data = Some(before.into());
        self
    }

    pub fn change(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_data = Some(before.into());
        self.after_data = Some(after.into());
        self
    }
}
