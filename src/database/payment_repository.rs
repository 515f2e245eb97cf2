use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::PaymentStore;
use crate::models::{NewPayment, Payment, PaymentMethod, PaymentStatus};

const PAYMENT_COLUMNS: &str = "id, order_id, amount, fee, total_payment, payment_method, \
     payment_number, gateway_reference, qr_image_url, status, expired_at, completed_at, \
     created_at";

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    amount: BigDecimal,
    fee: BigDecimal,
    total_payment: BigDecimal,
    payment_method: String,
    payment_number: String,
    gateway_reference: Option<String>,
    qr_image_url: Option<String>,
    status: String,
    expired_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let payment_method = row
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(DatabaseError::decode)?;
        let status = PaymentStatus::from_db(&row.status).ok_or_else(|| {
            DatabaseError::decode(format!("unknown payment status '{}'", row.status))
        })?;

        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            amount: row.amount,
            fee: row.fee,
            total_payment: row.total_payment,
            payment_method,
            payment_number: row.payment_number,
            gateway_reference: row.gateway_reference,
            qr_image_url: row.qr_image_url,
            status,
            expired_at: row.expired_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

/// Repository for the `payments` table
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let query = format!(
            "INSERT INTO payments
             (order_id, amount, fee, total_payment, payment_method, payment_number,
              gateway_reference, qr_image_url, status, expired_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, PaymentRow>(&query)
            .bind(payment.order_id)
            .bind(&payment.amount)
            .bind(&payment.fee)
            .bind(&payment.total_payment)
            .bind(payment.payment_method.as_str())
            .bind(&payment.payment_number)
            .bind(&payment.gateway_reference)
            .bind(&payment.qr_image_url)
            .bind(payment.expired_at)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Payment::try_from(row)
    }

    async fn find_latest_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, DatabaseError> {
        let query = format!(
            "UPDATE payments
             SET status = $3, completed_at = COALESCE($4, completed_at)
             WHERE id = $1 AND status = $2
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(completed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM payments
             WHERE status = 'pending' AND expired_at < $1
             ORDER BY expired_at ASC
             LIMIT $2",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }
}
