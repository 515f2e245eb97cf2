use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Immutable log row for one inbound callback
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub id: Uuid,
    pub source: String,
    pub payload: JsonValue,
    pub processed: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Operator action audit row
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub order_id: Option<Uuid>,
    pub details: JsonValue,
    pub ip_address: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: String,
    pub order_id: Option<Uuid>,
    pub details: JsonValue,
    pub ip_address: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}
