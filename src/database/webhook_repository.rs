use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::ReceiptStore;
use crate::models::WebhookReceipt;

#[derive(Debug, Clone, FromRow)]
struct WebhookLogRow {
    id: Uuid,
    source: String,
    payload: JsonValue,
    processed: bool,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<WebhookLogRow> for WebhookReceipt {
    fn from(row: WebhookLogRow) -> Self {
        WebhookReceipt {
            id: row.id,
            source: row.source,
            payload: row.payload,
            processed: row.processed,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

/// Append-only log of inbound callbacks (`webhook_logs`)
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReceiptStore for WebhookRepository {
    async fn log(&self, source: &str, payload: JsonValue) -> Result<WebhookReceipt, DatabaseError> {
        sqlx::query_as::<_, WebhookLogRow>(
            "INSERT INTO webhook_logs (source, payload)
             VALUES ($1, $2)
             RETURNING id, source, payload, processed, error_message, created_at",
        )
        .bind(source)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map(WebhookReceipt::from)
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_processed(&self, id: Uuid, error: Option<&str>) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE webhook_logs
             SET processed = TRUE, error_message = $2
             WHERE id = $1 AND processed = FALSE",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<WebhookReceipt>, DatabaseError> {
        sqlx::query_as::<_, WebhookLogRow>(
            "SELECT id, source, payload, processed, error_message, created_at
             FROM webhook_logs
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(WebhookReceipt::from).collect())
        .map_err(DatabaseError::from_sqlx)
    }
}
