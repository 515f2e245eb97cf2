use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Expired,
    Cancelled,
}

impl PaymentStatus {
    /// Completed, expired and cancelled payments are immutable
    pub fn is_final(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "expired" => Some(PaymentStatus::Expired),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which adapter class serves a payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayClass {
    Qr,
    VirtualAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Qris,
    BniVa,
    BriVa,
    MandiriVa,
    PermataVa,
    CimbNiagaVa,
    SampoernaVa,
    BncVa,
    MaybankVa,
    ArthaGrahaVa,
    AtmBersamaVa,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Qris => "qris",
            PaymentMethod::BniVa => "bni_va",
            PaymentMethod::BriVa => "bri_va",
            PaymentMethod::MandiriVa => "mandiri_va",
            PaymentMethod::PermataVa => "permata_va",
            PaymentMethod::CimbNiagaVa => "cimb_niaga_va",
            PaymentMethod::SampoernaVa => "sampoerna_va",
            PaymentMethod::BncVa => "bnc_va",
            PaymentMethod::MaybankVa => "maybank_va",
            PaymentMethod::ArthaGrahaVa => "artha_graha_va",
            PaymentMethod::AtmBersamaVa => "atm_bersama_va",
            PaymentMethod::Paypal => "paypal",
        }
    }

    pub fn gateway_class(&self) -> GatewayClass {
        match self {
            PaymentMethod::Qris => GatewayClass::Qr,
            _ => GatewayClass::VirtualAccount,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qris" => Ok(PaymentMethod::Qris),
            "bni_va" => Ok(PaymentMethod::BniVa),
            "bri_va" => Ok(PaymentMethod::BriVa),
            "mandiri_va" => Ok(PaymentMethod::MandiriVa),
            "permata_va" => Ok(PaymentMethod::PermataVa),
            "cimb_niaga_va" => Ok(PaymentMethod::CimbNiagaVa),
            "sampoerna_va" => Ok(PaymentMethod::SampoernaVa),
            "bnc_va" => Ok(PaymentMethod::BncVa),
            "maybank_va" => Ok(PaymentMethod::MaybankVa),
            "artha_graha_va" => Ok(PaymentMethod::ArthaGrahaVa),
            "atm_bersama_va" => Ok(PaymentMethod::AtmBersamaVa),
            "paypal" => Ok(PaymentMethod::Paypal),
            other => Err(format!("unsupported payment method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_payment: BigDecimal,
    pub payment_method: PaymentMethod,
    /// QR payload or virtual account number
    pub payment_number: String,
    /// Gateway-side transaction id, when the gateway issues one
    pub gateway_reference: Option<String>,
    pub qr_image_url: Option<String>,
    pub status: PaymentStatus,
    pub expired_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expired_at
    }

    pub fn to_response(&self, now: DateTime<Utc>) -> PaymentResponse {
        let expired_in = (self.expired_at - now).num_seconds().max(0);
        let (qr_string, va_number) = match self.payment_method.gateway_class() {
            GatewayClass::Qr => (Some(self.payment_number.clone()), None),
            GatewayClass::VirtualAccount => (None, Some(self.payment_number.clone())),
        };

        PaymentResponse {
            id: self.id,
            order_id: self.order_id,
            amount: self.amount.clone(),
            fee: self.fee.clone(),
            total_payment: self.total_payment.clone(),
            payment_method: self.payment_method,
            payment_number: self.payment_number.clone(),
            qr_string,
            qr_image_url: self.qr_image_url.clone(),
            va_number,
            status: self.status,
            expired_at: self.expired_at,
            expired_in,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_payment: BigDecimal,
    pub payment_method: PaymentMethod,
    pub payment_number: String,
    pub gateway_reference: Option<String>,
    pub qr_image_url: Option<String>,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_payment: BigDecimal,
    pub payment_method: PaymentMethod,
    pub payment_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub va_number: Option<String>,
    pub status: PaymentStatus,
    pub expired_at: DateTime<Utc>,
    /// Seconds until expiry, never negative
    pub expired_in: i64,
}
