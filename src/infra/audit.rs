//! Audit logging for seal lifecycle operations
//!
//! Every mutating seal operation emits one entry:
//! - Provisioning (single and batch)
//! - Attach / remove
//! - Verification (valid or tampered)
//! - Physical damage reports
//! - Expiry sweeps

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::traits::AuditSink;
use super::Result;

/// Resource type recorded for seal entries
pub const SEAL_RESOURCE: &str = "seal";

/// Audit log action types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SealProvisioned,
    SealAttached,
    SealVerified,
    SealTamperDetected,
    SealRemoved,
    SealDamageReported,
    SealExpired,

    // Other
    Custom(String),
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::SealProvisioned => write!(f, "seal_provisioned"),
            AuditAction::SealAttached => write!(f, "seal_attached"),
            AuditAction::SealVerified => write!(f, "seal_verified"),
            AuditAction::SealTamperDetected => write!(f, "seal_tamper_detected"),
            AuditAction::SealRemoved => write!(f, "seal_removed"),
            AuditAction::SealDamageReported => write!(f, "seal_damage_reported"),
            AuditAction::SealExpired => write!(f, "seal_expired"),
            AuditAction::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique audit log ID
    pub id: Uuid,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// The action that was performed
    pub action: AuditAction,
    /// Who performed the action (field agent, inspector, system)
    pub actor: String,
    /// Resource type that was affected
    pub resource_type: Option<String>,
    /// Resource ID that was affected
    pub resource_id: Option<String>,
    /// Additional details as JSON
    pub details: Option<serde_json::Value>,
    /// Whether the action succeeded
    pub success: bool,
    /// Error message if failed
    pub error_message: Option<String>,
}

/// Builder for creating audit log entries
pub struct AuditLogBuilder {
    action: AuditAction,
    actor: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    details: Option<serde_json::Value>,
    success: bool,
    error_message: Option<String>,
}

impl AuditLogBuilder {
    /// Create a new audit log builder
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error_message: None,
        }
    }

    /// Set the resource type and ID
    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Shorthand for a seal resource
    pub fn seal(self, seal_id: impl ToString) -> Self {
        self.resource(SEAL_RESOURCE, seal_id.to_string())
    }

    /// Set additional details
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error.into());
        self
    }

    /// Build the audit log entry
    pub fn build(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: self.action,
            actor: self.actor,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            details: self.details,
            success: self.success,
            error_message: self.error_message,
        }
    }
}

fn trace_entry(entry: &AuditLogEntry) {
    if entry.success {
        tracing::info!(
            action = %entry.action,
            actor = %entry.actor,
            resource_type = ?entry.resource_type,
            resource_id = ?entry.resource_id,
            "Audit log entry"
        );
    } else {
        tracing::warn!(
            action = %entry.action,
            actor = %entry.actor,
            resource_id = ?entry.resource_id,
            error = ?entry.error_message,
            "Audit log entry (failed)"
        );
    }
}

/// PostgreSQL-backed audit logger
pub struct PgAuditLogger {
    pool: PgPool,
}

impl PgAuditLogger {
    /// Create a new audit logger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, timestamp, action, actor,
                resource_type, resource_id,
                details, success, error_message
            ) VALUES (
                $1, $2, $3, $4,
                $5, $6,
                $7, $8, $9
            )
            "#,
        )
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(entry.action.to_string())
        .bind(&entry.actor)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(entry.success)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;

        // Also emit a tracing event
        trace_entry(&entry);

        Ok(())
    }

    /// Query audit logs with filters
    pub async fn query(
        &self,
        filters: AuditQueryFilters,
        limit: i64,
        offset: i64,
    ) -> std::result::Result<Vec<AuditLogEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT id, timestamp, action, actor,
                   resource_type, resource_id,
                   details, success, error_message
            FROM audit_log
            WHERE ($1::text IS NULL OR actor = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR resource_id = $3)
              AND ($4::timestamptz IS NULL OR timestamp >= $4)
              AND ($5::timestamptz IS NULL OR timestamp <= $5)
              AND ($6::boolean IS NULL OR success = $6)
            ORDER BY timestamp DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(&filters.actor)
        .bind(filters.action.as_ref().map(|a| a.to_string()))
        .bind(&filters.resource_id)
        .bind(filters.from)
        .bind(filters.to)
        .bind(if filters.failures_only == Some(true) {
            Some(false)
        } else {
            None
        })
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditLogEntry::from).collect())
    }

    /// Count audit log entries
    pub async fn count(&self) -> std::result::Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl AuditSink for PgAuditLogger {
    async fn record(&self, entry: AuditLogEntry) -> Result<()> {
        self.log(entry).await?;
        Ok(())
    }
}

/// Audit sink that only emits tracing events. Used when no database is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> Result<()> {
        trace_entry(&entry);
        Ok(())
    }
}

/// Query filters for audit logs
#[derive(Debug, Default)]
pub struct AuditQueryFilters {
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub failures_only: Option<bool>,
}

/// Database row for audit log
#[derive(Debug, sqlx::FromRow)]
struct AuditLogRow {
    id: Uuid,
    timestamp: DateTime<Utc>,
    action: String,
    actor: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    details: Option<serde_json::Value>,
    success: bool,
    error_message: Option<String>,
}

impl From<AuditLogRow> for AuditLogEntry {
    fn from(row: AuditLogRow) -> Self {
        let action = parse_audit_action(&row.action);

        Self {
            id: row.id,
            timestamp: row.timestamp,
            action,
            actor: row.actor,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            details: row.details,
            success: row.success,
            error_message: row.error_message,
        }
    }
}

pub(crate) fn parse_audit_action(s: &str) -> AuditAction {
    match s {
        "seal_provisioned" => AuditAction::SealProvisioned,
        "seal_attached" => AuditAction::SealAttached,
        "seal_verified" => AuditAction::SealVerified,
        "seal_tamper_detected" => AuditAction::SealTamperDetected,
        "seal_removed" => AuditAction::SealRemoved,
        "seal_damage_reported" => AuditAction::SealDamageReported,
        "seal_expired" => AuditAction::SealExpired,
        s if s.starts_with("custom:") => AuditAction::Custom(s[7..].to_string()),
        _ => AuditAction::Custom(s.to_string()),
    }
}
