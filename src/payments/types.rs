use crate::models::PaymentMethod;
use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GatewayName {
    Qrispw,
    Pakasir,
}

impl GatewayName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayName::Qrispw => "qrispw",
            GatewayName::Pakasir => "pakasir",
        }
    }
}

impl std::fmt::Display for GatewayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GatewayName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "qrispw" | "qris.pw" => Ok(GatewayName::Qrispw),
            "pakasir" => Ok(GatewayName::Pakasir),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported gateway: {}", value),
                field: Some("gateway".to_string()),
            }),
        }
    }
}

/// Instrument request for one order
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub ref_id: String,
    pub amount: BigDecimal,
    pub method: PaymentMethod,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

/// What the gateway issued: the QR string or VA number the buyer pays to
#[derive(Debug, Clone)]
pub struct PaymentInstrument {
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_payment: BigDecimal,
    pub payment_number: String,
    pub gateway_reference: Option<String>,
    pub qr_image_url: Option<String>,
    pub expired_at: DateTime<Utc>,
}

/// Identifies an existing instrument for cancel and detail lookups
#[derive(Debug, Clone)]
pub struct PaymentQuery {
    pub ref_id: String,
    pub amount: BigDecimal,
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Pending,
    Completed,
    Expired,
}

impl GatewayPaymentStatus {
    /// Both gateways' vocabularies (`paid` and `completed` mean the same)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(GatewayPaymentStatus::Pending),
            "paid" | "completed" | "success" => Some(GatewayPaymentStatus::Completed),
            "expired" => Some(GatewayPaymentStatus::Expired),
            _ => None,
        }
    }
}

/// Normalized payment notification
#[derive(Debug, Clone)]
pub struct GatewayWebhookEvent {
    pub gateway: GatewayName,
    pub ref_id: String,
    pub amount: BigDecimal,
    /// `None` when the gateway sent a status outside its vocabulary
    pub status: Option<GatewayPaymentStatus>,
    pub raw_status: String,
    pub gateway_reference: Option<String>,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl WebhookVerificationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}
