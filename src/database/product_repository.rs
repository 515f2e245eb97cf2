use async_trait::async_trait;
use sqlx::{types::BigDecimal, FromRow, PgPool};

use crate::database::error::DatabaseError;
use crate::database::repository::CatalogStore;
use crate::models::Product;

#[derive(Debug, Clone, FromRow)]
struct ProductRow {
    buyer_sku_code: String,
    product_name: String,
    buy_price: BigDecimal,
    selling_price: BigDecimal,
    discount_price: Option<BigDecimal>,
    member_price: Option<BigDecimal>,
    is_available: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            buyer_sku_code: row.buyer_sku_code,
            name: row.product_name,
            buy_price: row.buy_price,
            selling_price: row.selling_price,
            discount_price: row.discount_price,
            member_price: row.member_price,
            is_available: row.is_available,
        }
    }
}

/// Read-only view of the product catalog
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for ProductRepository {
    async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, DatabaseError> {
        sqlx::query_as::<_, ProductRow>(
            "SELECT buyer_sku_code, product_name, buy_price, selling_price, discount_price,
                    member_price, is_available
             FROM products WHERE buyer_sku_code = $1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(Product::from))
        .map_err(DatabaseError::from_sqlx)
    }
}
