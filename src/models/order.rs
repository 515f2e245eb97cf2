use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::{Payment, PaymentResponse};

// ============================================================================
// Order status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, no payment instrument yet
    Pending,
    /// Payment instrument issued, waiting for the customer
    WaitingPayment,
    /// Payment confirmed by the gateway
    Paid,
    /// Topup in flight at the fulfillment provider
    Processing,
    Success,
    Failed,
    Expired,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::WaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Success,
        OrderStatus::Failed,
        OrderStatus::Expired,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// The single transition table. Self-edges are handled by the caller.
    pub fn valid_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[WaitingPayment, Processing, Expired, Cancelled, Refunded],
            WaitingPayment => &[Paid, Expired, Cancelled, Refunded],
            Paid => &[Processing, Expired, Cancelled, Refunded],
            Processing => &[Success, Failed, Expired, Cancelled, Refunded],
            // Terminal states
            Success | Failed | Expired | Cancelled | Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Success
                | OrderStatus::Failed
                | OrderStatus::Expired
                | OrderStatus::Cancelled
                | OrderStatus::Refunded
        )
    }

    /// Operator-only edge used by manual remediation, outside the automated table
    pub fn operator_retry_allowed(&self) -> bool {
        matches!(self, OrderStatus::Failed)
    }

    /// Customer-facing label
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending | OrderStatus::WaitingPayment => "Menunggu Pembayaran",
            OrderStatus::Paid => "Pembayaran Berhasil",
            OrderStatus::Processing => "Sedang Diproses",
            OrderStatus::Success => "Berhasil",
            OrderStatus::Failed => "Gagal",
            OrderStatus::Expired => "Kadaluwarsa",
            OrderStatus::Cancelled => "Dibatalkan",
            OrderStatus::Refunded => "Dana Dikembalikan",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(OrderStatus::Pending),
            "waiting_payment" => Some(OrderStatus::WaitingPayment),
            "paid" => Some(OrderStatus::Paid),
            "processing" => Some(OrderStatus::Processing),
            "success" => Some(OrderStatus::Success),
            "failed" => Some(OrderStatus::Failed),
            "expired" => Some(OrderStatus::Expired),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }

    pub fn to_db_status(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::WaitingPayment => "waiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
            OrderStatus::Expired => "expired",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_status())
    }
}

// ============================================================================
// Order source
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    Web,
    Member,
    AdminCash,
    AdminGift,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::Web => "web",
            OrderSource::Member => "member",
            OrderSource::AdminCash => "admin_cash",
            OrderSource::AdminGift => "admin_gift",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "web" => Some(OrderSource::Web),
            "member" => Some(OrderSource::Member),
            "admin_cash" => Some(OrderSource::AdminCash),
            "admin_gift" => Some(OrderSource::AdminGift),
            _ => None,
        }
    }
}

// ============================================================================
// Order entity
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    /// Immutable correlation key shared with the payment gateway
    pub ref_id: String,
    /// Id sent to the fulfillment provider; equals `ref_id` until an operator retry
    pub provider_ref_id: String,
    pub buyer_sku_code: String,
    pub product_name: String,
    pub customer_no: String,
    /// Internal cost basis, never shown to customers
    #[serde(skip_serializing)]
    pub buy_price: BigDecimal,
    pub selling_price: BigDecimal,
    pub status: OrderStatus,
    pub provider_status: Option<String>,
    pub provider_rc: Option<String>,
    pub serial_number: Option<String>,
    pub provider_message: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub order_source: OrderSource,
    pub admin_notes: Option<String>,
    pub member_id: Option<Uuid>,
    pub member_price: Option<BigDecimal>,
    pub recheck_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Amount to return to the member on failure, taken from the frozen snapshot.
    /// `None` for orders not paid from a prepaid balance.
    pub fn refundable_amount(&self) -> Option<(Uuid, BigDecimal)> {
        let member_id = self.member_id?;
        let amount = self
            .member_price
            .clone()
            .unwrap_or_else(|| self.selling_price.clone());
        Some((member_id, amount))
    }

    /// Provider wording is shown while in flight; failures get a fixed notice
    fn customer_message(&self) -> Option<String> {
        match (self.status, self.member_id) {
            (OrderStatus::Failed, Some(_)) => {
                Some("Transaksi gagal, saldo telah dikembalikan".to_string())
            }
            (OrderStatus::Failed, None) => {
                Some("Transaksi gagal, silakan hubungi admin".to_string())
            }
            _ => self.provider_message.clone(),
        }
    }

    pub fn to_response(&self, payment: Option<&Payment>, now: DateTime<Utc>) -> OrderResponse {
        OrderResponse {
            id: self.id,
            ref_id: self.ref_id.clone(),
            product_name: self.product_name.clone(),
            customer_no: self.customer_no.clone(),
            price: self.selling_price.clone(),
            status: self.status,
            status_label: self.status.label().to_string(),
            serial_number: self.serial_number.clone(),
            message: self.customer_message(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            payment: payment.map(|p| p.to_response(now)),
            is_member: self.member_id.is_some(),
        }
    }
}

/// Insert payload for a new order
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub ref_id: String,
    pub buyer_sku_code: String,
    pub product_name: String,
    pub customer_no: String,
    pub buy_price: BigDecimal,
    pub selling_price: BigDecimal,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub order_source: OrderSource,
    pub admin_notes: Option<String>,
    pub member_id: Option<Uuid>,
    pub member_price: Option<BigDecimal>,
}

/// Last known fulfillment provider state stored alongside a transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMeta {
    pub status: Option<String>,
    pub rc: Option<String>,
    pub serial: Option<String>,
    pub message: Option<String>,
}

impl ProviderMeta {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.rc.is_none() && self.serial.is_none() && self.message.is_none()
    }
}

/// Customer-facing order view. Provider codes and cost basis stay internal.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub ref_id: String,
    pub product_name: String,
    pub customer_no: String,
    pub price: BigDecimal,
    pub status: OrderStatus,
    pub status_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentResponse>,
    pub is_member: bool,
}

// ============================================================================
// Ref id generation
// ============================================================================

const REF_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| REF_CHARSET[rng.gen_range(0..REF_CHARSET.len())] as char)
        .collect()
}

/// `GVS-{millis}-{6 chars}` for storefront orders
pub fn web_ref_id(now: DateTime<Utc>) -> String {
    format!("GVS-{}-{}", now.timestamp_millis(), random_suffix(6))
}

/// `INV-{secs}-{5 chars}` for member purchases
pub fn member_ref_id(now: DateTime<Utc>) -> String {
    format!("INV-{}-{}", now.timestamp(), random_suffix(5))
}

pub fn admin_ref_id(now: DateTime<Utc>) -> String {
    format!("ADMIN-{}-{}", now.timestamp_millis(), random_suffix(4))
}

/// Fresh provider id for a manual retry; the provider treats a reused id as a status check
pub fn retry_ref_id(now: DateTime<Utc>) -> String {
    format!("RETRY-{}-{}", now.timestamp_millis(), random_suffix(4))
}
