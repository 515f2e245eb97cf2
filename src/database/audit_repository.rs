use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::AuditStore;
use crate::models::{AuditEntry, NewAuditEntry};

#[derive(Debug, Clone, FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    order_id: Option<Uuid>,
    details: JsonValue,
    ip_address: Option<String>,
    success: bool,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            action: row.action,
            order_id: row.order_id,
            details: row.details,
            ip_address: row.ip_address,
            success: row.success,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

/// Operator action trail (`admin_audit_logs`)
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for AuditRepository {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError> {
        sqlx::query_as::<_, AuditRow>(
            "INSERT INTO admin_audit_logs
             (action, order_id, details, ip_address, success, error_message)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, action, order_id, details, ip_address, success, error_message,
                       created_at",
        )
        .bind(&entry.action)
        .bind(entry.order_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(entry.success)
        .bind(&entry.error_message)
        .fetch_one(&self.pool)
        .await
        .map(AuditEntry::from)
        .map_err(DatabaseError::from_sqlx)
    }

    async fn count_successful_since(
        &self,
        actions: &[&str],
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let actions: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM admin_audit_logs
             WHERE action = ANY($1) AND success = TRUE AND created_at >= $2",
        )
        .bind(&actions)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
