use bigdecimal::BigDecimal;
use serde::Serialize;

/// Read-only catalog snapshot used for price freezing
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub buyer_sku_code: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub buy_price: BigDecimal,
    pub selling_price: BigDecimal,
    pub discount_price: Option<BigDecimal>,
    pub member_price: Option<BigDecimal>,
    pub is_available: bool,
}

impl Product {
    /// Storefront price: discount when present, plus the flat admin fee
    pub fn web_price(&self, admin_fee: &BigDecimal) -> BigDecimal {
        let base = self
            .discount_price
            .clone()
            .unwrap_or_else(|| self.selling_price.clone());
        base + admin_fee
    }

    /// Reseller price, falling back to the storefront base price
    pub fn member_price_or_selling(&self) -> BigDecimal {
        self.member_price
            .clone()
            .unwrap_or_else(|| self.selling_price.clone())
    }
}
