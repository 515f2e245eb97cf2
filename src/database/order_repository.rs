use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::OrderStore;
use crate::models::{NewOrder, Order, OrderSource, OrderStatus, ProviderMeta};

const ORDER_COLUMNS: &str = "id, ref_id, provider_ref_id, buyer_sku_code, product_name, \
     customer_no, buy_price, selling_price, status, provider_status, provider_rc, \
     serial_number, provider_message, customer_name, customer_email, customer_phone, \
     order_source, admin_notes, member_id, member_price, recheck_attempts, created_at, \
     updated_at, completed_at";

/// Raw `orders` row
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: Uuid,
    ref_id: String,
    provider_ref_id: String,
    buyer_sku_code: String,
    product_name: String,
    customer_no: String,
    buy_price: BigDecimal,
    selling_price: BigDecimal,
    status: String,
    provider_status: Option<String>,
    provider_rc: Option<String>,
    serial_number: Option<String>,
    provider_message: Option<String>,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    order_source: String,
    admin_notes: Option<String>,
    member_id: Option<Uuid>,
    member_price: Option<BigDecimal>,
    recheck_attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_db_status(&row.status).ok_or_else(|| {
            DatabaseError::decode(format!("unknown order status '{}'", row.status))
        })?;
        let order_source = OrderSource::from_db(&row.order_source).ok_or_else(|| {
            DatabaseError::decode(format!("unknown order source '{}'", row.order_source))
        })?;

        Ok(Order {
            id: row.id,
            ref_id: row.ref_id,
            provider_ref_id: row.provider_ref_id,
            buyer_sku_code: row.buyer_sku_code,
            product_name: row.product_name,
            customer_no: row.customer_no,
            buy_price: row.buy_price,
            selling_price: row.selling_price,
            status,
            provider_status: row.provider_status,
            provider_rc: row.provider_rc,
            serial_number: row.serial_number,
            provider_message: row.provider_message,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            order_source,
            admin_notes: row.admin_notes,
            member_id: row.member_id,
            member_price: row.member_price,
            recheck_attempts: row.recheck_attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, DatabaseError> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Repository for the `orders` table
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<Order>, DatabaseError> {
        let query = format!("SELECT {} FROM orders WHERE {} = $1", ORDER_COLUMNS, column);
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        let query = format!(
            "INSERT INTO orders
             (ref_id, provider_ref_id, buyer_sku_code, product_name, customer_no, buy_price,
              selling_price, status, customer_name, customer_email, customer_phone,
              order_source, admin_notes, member_id, member_price)
             VALUES ($1, $1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $10, $11, $12, $13)
             RETURNING {}",
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&query)
            .bind(&order.ref_id)
            .bind(&order.buyer_sku_code)
            .bind(&order.product_name)
            .bind(&order.customer_no)
            .bind(&order.buy_price)
            .bind(&order.selling_price)
            .bind(&order.customer_name)
            .bind(&order.customer_email)
            .bind(&order.customer_phone)
            .bind(order.order_source.as_str())
            .bind(&order.admin_notes)
            .bind(order.member_id)
            .bind(&order.member_price)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Order::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_ref_id(&self, ref_id: &str) -> Result<Option<Order>, DatabaseError> {
        self.fetch_one_by("ref_id", ref_id).await
    }

    async fn find_by_provider_ref_id(
        &self,
        provider_ref_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        self.fetch_one_by("provider_ref_id", provider_ref_id).await
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        meta: &ProviderMeta,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, DatabaseError> {
        let query = format!(
            "UPDATE orders
             SET status = $3,
                 provider_status = COALESCE($4, provider_status),
                 provider_rc = COALESCE($5, provider_rc),
                 serial_number = COALESCE($6, serial_number),
                 provider_message = COALESCE($7, provider_message),
                 completed_at = COALESCE($8, completed_at),
                 updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {}",
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .bind(expected.to_db_status())
            .bind(next.to_db_status())
            .bind(&meta.status)
            .bind(&meta.rc)
            .bind(&meta.serial)
            .bind(&meta.message)
            .bind(completed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }

    async fn reopen_for_retry(
        &self,
        id: Uuid,
        provider_ref_id: &str,
        customer_no: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let query = format!(
            "UPDATE orders
             SET status = 'processing',
                 provider_ref_id = $2,
                 customer_no = $3,
                 provider_status = NULL,
                 provider_rc = NULL,
                 serial_number = NULL,
                 provider_message = NULL,
                 completed_at = NULL,
                 recheck_attempts = 0,
                 updated_at = NOW()
             WHERE id = $1 AND status = 'failed'
             RETURNING {}",
            ORDER_COLUMNS
        );

        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .bind(provider_ref_id)
            .bind(customer_no)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_by_status_before(
        &self,
        status: OrderStatus,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM orders
             WHERE status = $1 AND updated_at < $2
             ORDER BY updated_at ASC
             LIMIT $3",
            ORDER_COLUMNS
        );

        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(status.to_db_status())
            .bind(updated_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        into_orders(rows)
    }

    async fn list_pending_rechecks(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM orders
             WHERE status = 'processing'
               AND provider_status = 'Pending'
               AND recheck_attempts < $1
             ORDER BY updated_at ASC
             LIMIT $2",
            ORDER_COLUMNS
        );

        let rows = sqlx::query_as::<_, OrderRow>(&query)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        into_orders(rows)
    }

    async fn increment_recheck_attempts(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders SET recheck_attempts = recheck_attempts + 1, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}
