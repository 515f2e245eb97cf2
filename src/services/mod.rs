//! Business logic: order lifecycle, payment reconciliation, fulfillment,
//! member ledger and operator tooling

pub mod admin_service;
pub mod balance;
pub mod operator;
pub mod order_lifecycle;
pub mod order_service;
pub mod reconciler;
pub mod topup_orchestrator;
pub mod webhook_processor;

pub use admin_service::{AdminError, AdminService, OperatorGuards};
pub use balance::{LedgerError, LedgerReceipt, LedgerService};
pub use operator::{AuditRateLimiter, OperatorChallenge, RateLimiter, TotpChallenge};
pub use order_lifecycle::{LifecycleError, OrderLifecycle, TransitionOutcome};
pub use order_service::{OrderService, OrderServiceError, OrderView};
pub use reconciler::{PaymentReconciler, ReconcileError, Settlement};
pub use topup_orchestrator::{CallbackDisposition, TopupError, TopupOrchestrator};
pub use webhook_processor::{WebhookError, WebhookOutcome, WebhookProcessor};
