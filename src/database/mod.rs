//! Postgres persistence: pool setup, error mapping, store traits and repositories

pub mod audit_repository;
pub mod error;
pub mod member_repository;
pub mod order_repository;
pub mod payment_repository;
pub mod product_repository;
pub mod repository;
pub mod webhook_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error as log_error, info};

use self::audit_repository::AuditRepository;
use self::error::DatabaseError;
use self::member_repository::MemberRepository;
use self::order_repository::OrderRepository;
use self::payment_repository::PaymentRepository;
use self::product_repository::ProductRepository;
use self::repository::{
    AuditStore, CatalogStore, LedgerStore, OrderStore, PaymentStore, ReceiptStore,
};
use self::webhook_repository::WebhookRepository;
use crate::config::DatabaseConfig;

/// Every store the services need, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub audit: Arc<dyn AuditStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            orders: Arc::new(OrderRepository::new(pool.clone())),
            payments: Arc::new(PaymentRepository::new(pool.clone())),
            ledger: Arc::new(MemberRepository::new(pool.clone())),
            receipts: Arc::new(WebhookRepository::new(pool.clone())),
            audit: Arc::new(AuditRepository::new(pool.clone())),
            catalog: Arc::new(ProductRepository::new(pool.clone())),
        }
    }
}

/// Sizing and timeouts for the shared pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl From<&DatabaseConfig> for PoolSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout: Duration::from_secs(config.connection_timeout),
            idle_timeout: Duration::from_secs(config.idle_timeout.unwrap_or(600)),
            ..Self::default()
        }
    }
}

/// Opens the pool and proves one connection can be acquired
pub async fn init_pool(
    database_url: &str,
    settings: Option<PoolSettings>,
) -> Result<PgPool, DatabaseError> {
    let settings = settings.unwrap_or_default();

    info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        acquire_timeout = ?settings.acquire_timeout,
        "Opening order database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .max_lifetime(settings.max_lifetime)
        .connect(database_url)
        .await
        .map_err(|e| {
            log_error!(error = %e, "Order database unreachable");
            DatabaseError::from_sqlx(e)
        })?;

    pool.acquire().await.map_err(|e| {
        log_error!(error = %e, "Pool opened but no connection could be acquired");
        DatabaseError::from_sqlx(e)
    })?;

    Ok(pool)
}

/// Pool built from the `DB_*` settings
pub async fn init_pool_from_config(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    init_pool(&config.url, Some(PoolSettings::from(config))).await
}
