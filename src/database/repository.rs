//! Store traits sitting between the services and Postgres.
//!
//! Every service takes `Arc<dyn ...Store>` so it can run against the
//! sqlx repositories in production and in-memory stores in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::error::DatabaseError;
use crate::models::{
    AuditEntry, LedgerEntry, LedgerMutation, LedgerWrite, Member, NewAuditEntry, NewOrder,
    NewPayment, Order, OrderStatus, Payment, PaymentStatus, Product, ProviderMeta, WebhookReceipt,
};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts in `pending`. A duplicate ref_id surfaces as a unique violation.
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn find_by_ref_id(&self, ref_id: &str) -> Result<Option<Order>, DatabaseError>;

    /// Lookup by the id last sent to the fulfillment provider
    async fn find_by_provider_ref_id(
        &self,
        provider_ref_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Atomic compare-and-set: writes `next` and the provider fields only
    /// while the row is still in `expected`. `None` means another writer won.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        meta: &ProviderMeta,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Operator retry edge `failed -> processing` with a fresh provider ref id
    async fn reopen_for_retry(
        &self,
        id: Uuid,
        provider_ref_id: &str,
        customer_no: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    async fn list_by_status_before(
        &self,
        status: OrderStatus,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError>;

    /// Processing orders whose provider answer was `Pending`
    async fn list_pending_rechecks(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError>;

    async fn increment_recheck_attempts(&self, id: Uuid) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: NewPayment) -> Result<Payment, DatabaseError>;

    async fn find_latest_for_order(&self, order_id: Uuid)
        -> Result<Option<Payment>, DatabaseError>;

    /// Compare-and-set on payment status; final payments never change again
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, DatabaseError>;

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_member(&self, id: Uuid) -> Result<Option<Member>, DatabaseError>;

    /// Locks the member row, checks the resulting balance is not negative,
    /// writes the balance and one ledger row, and commits both or neither.
    async fn apply(&self, mutation: LedgerMutation) -> Result<LedgerWrite, DatabaseError>;

    async fn entries_for(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, DatabaseError>;
}

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn log(&self, source: &str, payload: JsonValue) -> Result<WebhookReceipt, DatabaseError>;

    async fn mark_processed(&self, id: Uuid, error: Option<&str>) -> Result<(), DatabaseError>;

    async fn recent(&self, limit: i64) -> Result<Vec<WebhookReceipt>, DatabaseError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError>;

    async fn count_successful_since(
        &self,
        actions: &[&str],
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, DatabaseError>;
}
