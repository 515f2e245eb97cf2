//! Fulfillment provider seam: the upstream that actually delivers the goods.

pub mod digiflazz;
pub mod error;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::models::ProviderMeta;

pub use digiflazz::DigiflazzProvider;
pub use error::{FulfillmentError, FulfillmentResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopupRequest {
    /// Provider-side idempotency key; resending it is a status check
    pub ref_id: String,
    pub buyer_sku_code: String,
    pub customer_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    Success { serial: Option<String> },
    Pending,
    Failed,
}

/// One normalized provider answer
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub outcome: FulfillmentOutcome,
    /// Status string as the provider sent it
    pub raw_status: String,
    pub rc: Option<String>,
    pub message: Option<String>,
    pub price: Option<BigDecimal>,
}

impl ProviderResult {
    pub fn meta(&self) -> ProviderMeta {
        let serial = match &self.outcome {
            FulfillmentOutcome::Success { serial } => serial.clone(),
            _ => None,
        };
        ProviderMeta {
            status: Some(self.raw_status.clone()),
            rc: self.rc.clone(),
            serial,
            message: self.message.clone(),
        }
    }
}

/// Asynchronous result pushed by the provider
#[derive(Debug, Clone)]
pub struct ProviderCallback {
    pub ref_id: String,
    pub result: ProviderResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderBalance {
    pub deposit: BigDecimal,
    /// Served from the in-process cache
    pub cached: bool,
    /// The live lookup failed and this is the last known value
    pub stale: bool,
}

#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    async fn topup(&self, request: &TopupRequest) -> FulfillmentResult<ProviderResult>;

    async fn check_balance(&self) -> FulfillmentResult<ProviderBalance>;

    fn verify_callback(&self, payload: &[u8], signature: Option<&str>) -> bool;

    fn parse_callback(&self, payload: &[u8]) -> FulfillmentResult<ProviderCallback>;
}
