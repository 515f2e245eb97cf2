//! Domain entities shared by the stores, adapters and services

pub mod member;
pub mod order;
pub mod payment;
pub mod product;
pub mod webhook;

pub use member::{LedgerEntry, LedgerEntryType, LedgerMutation, LedgerWrite, Member, MemberStatus};
pub use order::{
    admin_ref_id, member_ref_id, retry_ref_id, web_ref_id, NewOrder, Order, OrderResponse,
    OrderSource, OrderStatus, ProviderMeta,
};
pub use payment::{GatewayClass, NewPayment, Payment, PaymentMethod, PaymentResponse, PaymentStatus};
pub use product::Product;
pub use webhook::{AuditEntry, NewAuditEntry, WebhookReceipt};
