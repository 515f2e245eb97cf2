//! Operator remediation and inspection. Every state-changing call leaves an
//! audit row, successful or not.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::{AuditStore, CatalogStore, ReceiptStore};
use crate::database::Stores;
use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};
use crate::fulfillment::{FulfillmentError, ProviderBalance};
use crate::models::{
    admin_ref_id, NewAuditEntry, NewOrder, Order, OrderSource, OrderStatus, PaymentStatus,
    WebhookReceipt,
};
use crate::payments::utils::secure_eq;
use crate::services::balance::{LedgerError, LedgerReceipt, LedgerService};
use crate::services::operator::{
    OperatorChallenge, RateLimiter, ACTION_CUSTOM_TOPUP, ACTION_MANUAL_TOPUP,
};
use crate::services::order_lifecycle::{LifecycleError, OrderLifecycle};
use crate::services::reconciler::{PaymentReconciler, ReconcileError};
use crate::services::topup_orchestrator::{TopupError, TopupOrchestrator};

const ACTION_CHECK_STATUS: &str = "check_status";
const ACTION_MEMBER_TOPUP: &str = "member_topup";
const MAX_WEBHOOK_PAGE: i64 = 200;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("operator topup limit of {limit} per hour reached")]
    RateLimited { limit: i64 },

    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Topup(#[from] TopupError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl AdminError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        AdminError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Unauthorized(reason) => AppError::unauthorized(reason),
            AdminError::RateLimited { .. } => {
                AppError::new(AppErrorKind::External(ExternalError::RateLimit {
                    service: "operator_topup".to_string(),
                    retry_after: Some(3600),
                }))
            }
            AdminError::Validation { field, reason } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field,
                    reason,
                }))
            }
            AdminError::NotFound { entity, id } => AppError::not_found(entity, id),
            AdminError::Topup(e) => e.into(),
            AdminError::Reconcile(e) => e.into(),
            AdminError::Lifecycle(e) => e.into(),
            AdminError::Ledger(e) => e.into(),
            AdminError::Fulfillment(e) => e.into(),
            AdminError::Database(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualTopupRequest {
    pub totp_code: String,
    pub customer_no: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomTopupSource {
    Cash,
    Gift,
}

impl CustomTopupSource {
    fn order_source(self) -> OrderSource {
        match self {
            CustomTopupSource::Cash => OrderSource::AdminCash,
            CustomTopupSource::Gift => OrderSource::AdminGift,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomTopupRequest {
    pub sku: String,
    pub customer_no: String,
    pub source: CustomTopupSource,
    pub notes: Option<String>,
    pub password: String,
    pub totp_code: String,
}

/// Second factor, hourly ceiling and the static admin password
pub struct OperatorGuards {
    pub challenge: Arc<dyn OperatorChallenge>,
    pub limiter: Arc<dyn RateLimiter>,
    pub password: String,
    pub max_topups_per_hour: i64,
}

pub struct AdminService {
    lifecycle: Arc<OrderLifecycle>,
    reconciler: Arc<PaymentReconciler>,
    orchestrator: Arc<TopupOrchestrator>,
    ledger: Arc<LedgerService>,
    catalog: Arc<dyn CatalogStore>,
    audit: Arc<dyn AuditStore>,
    receipts: Arc<dyn ReceiptStore>,
    guards: OperatorGuards,
}

impl AdminService {
    pub fn new(
        lifecycle: Arc<OrderLifecycle>,
        reconciler: Arc<PaymentReconciler>,
        orchestrator: Arc<TopupOrchestrator>,
        ledger: Arc<LedgerService>,
        stores: &Stores,
        guards: OperatorGuards,
    ) -> Self {
        Self {
            lifecycle,
            reconciler,
            orchestrator,
            ledger,
            catalog: stores.catalog.clone(),
            audit: stores.audit.clone(),
            receipts: stores.receipts.clone(),
            guards,
        }
    }

    /// Re-sends a failed, already paid order to the provider under a fresh provider ref id
    pub async fn manual_topup(
        &self,
        order_id: Uuid,
        request: ManualTopupRequest,
        ip_address: Option<String>,
    ) -> Result<Order, AdminError> {
        let details = json!({ "customer_no": request.customer_no });
        let result = self.run_manual_topup(order_id, &request).await;
        let error_message = dispatch_error(&result);
        self.record_entry(ACTION_MANUAL_TOPUP, Some(order_id), details, ip_address, error_message)
            .await;
        result
    }

    async fn run_manual_topup(
        &self,
        order_id: Uuid,
        request: &ManualTopupRequest,
    ) -> Result<Order, AdminError> {
        self.check_challenge(&request.totp_code)?;
        self.check_ceiling(ACTION_MANUAL_TOPUP).await?;

        let order = self.lifecycle.get_by_id(order_id).await?;
        if !order.status.operator_retry_allowed() {
            return Err(AdminError::validation(
                "status",
                format!("only failed orders can be retried, order is {}", order.status),
            ));
        }

        // Operator-created orders have no gateway payment behind them
        let prepaid_by_operator = matches!(
            order.order_source,
            OrderSource::AdminCash | OrderSource::AdminGift
        );
        if !prepaid_by_operator {
            let paid = self
                .reconciler
                .latest_payment(&order)
                .await?
                .is_some_and(|p| p.status == PaymentStatus::Completed);
            if !paid {
                return Err(AdminError::validation(
                    "payment",
                    "order has no completed payment",
                ));
            }
        }

        let order = self
            .orchestrator
            .manual_retry(&order, request.customer_no.as_deref())
            .await?;
        info!(
            ref_id = %order.ref_id,
            provider_ref_id = %order.provider_ref_id,
            status = %order.status,
            "Manual topup dispatched"
        );
        Ok(order)
    }

    /// Operator-funded order (cash at the counter or a gift), fulfilled immediately
    pub async fn custom_topup(
        &self,
        request: CustomTopupRequest,
        ip_address: Option<String>,
    ) -> Result<Order, AdminError> {
        let details = json!({
            "sku": request.sku,
            "customer_no": request.customer_no,
            "source": request.source.order_source().as_str(),
            "notes": request.notes,
        });
        let result = self.run_custom_topup(&request).await;
        let order_id = result.as_ref().ok().map(|o| o.id);
        let error_message = dispatch_error(&result);
        self.record_entry(ACTION_CUSTOM_TOPUP, order_id, details, ip_address, error_message)
            .await;
        result
    }

    async fn run_custom_topup(&self, request: &CustomTopupRequest) -> Result<Order, AdminError> {
        if self.guards.password.is_empty()
            || !secure_eq(request.password.as_bytes(), self.guards.password.as_bytes())
        {
            return Err(AdminError::Unauthorized("invalid admin password".to_string()));
        }
        self.check_challenge(&request.totp_code)?;
        self.check_ceiling(ACTION_CUSTOM_TOPUP).await?;

        let customer_no = request.customer_no.trim();
        if customer_no.is_empty() {
            return Err(AdminError::validation("customer_no", "must not be empty"));
        }

        let product = self
            .catalog
            .get_by_sku(request.sku.trim())
            .await?
            .ok_or_else(|| AdminError::NotFound {
                entity: "product",
                id: request.sku.clone(),
            })?;
        if !product.is_available {
            return Err(AdminError::validation("sku", "product is not available"));
        }

        let order = self
            .orchestrator
            .open_prepaid_order(NewOrder {
                ref_id: admin_ref_id(Utc::now()),
                buyer_sku_code: product.buyer_sku_code.clone(),
                product_name: product.name.clone(),
                customer_no: customer_no.to_string(),
                buy_price: product.buy_price.clone(),
                selling_price: product.selling_price.clone(),
                customer_name: None,
                customer_email: None,
                customer_phone: None,
                order_source: request.source.order_source(),
                admin_notes: request.notes.clone(),
                member_id: None,
                member_price: None,
            })
            .await?;

        Ok(self.orchestrator.dispatch(order).await?)
    }

    /// Reconciles one order against its gateway, or re-checks it with the provider
    pub async fn check_status(&self, order_id: Uuid) -> Result<Order, AdminError> {
        let result = self.run_check_status(order_id).await;
        let details = match &result {
            Ok(order) => json!({ "status": order.status }),
            Err(_) => JsonValue::Null,
        };
        self.record(ACTION_CHECK_STATUS, Some(order_id), details, None, &result)
            .await;
        result
    }

    async fn run_check_status(&self, order_id: Uuid) -> Result<Order, AdminError> {
        let order = self.lifecycle.get_by_id(order_id).await?;

        match order.status {
            OrderStatus::WaitingPayment => {
                let payment = self
                    .reconciler
                    .latest_payment(&order)
                    .await?
                    .filter(|p| p.status == PaymentStatus::Pending);
                if let Some(payment) = payment {
                    if payment.is_past_expiry(Utc::now()) {
                        self.reconciler.expire_lapsed(&order, &payment).await?;
                    } else {
                        self.reconciler.poll_gateway(&order).await?;
                    }
                }
            }
            OrderStatus::Paid => {
                self.orchestrator.fulfill_paid_order(order.id).await?;
            }
            OrderStatus::Processing => {
                self.orchestrator.recheck(order.clone()).await?;
            }
            _ => {}
        }

        Ok(self.lifecycle.get_by_id(order_id).await?)
    }

    /// Credits a member balance by hand
    pub async fn topup_member(
        &self,
        member_id: Uuid,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Result<LedgerReceipt, AdminError> {
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "Topup saldo oleh admin".to_string());
        let details = json!({ "member_id": member_id, "amount": amount.to_string() });

        let result = self
            .ledger
            .credit(member_id, &amount, description, "admin")
            .await
            .map_err(AdminError::from);
        self.record(ACTION_MEMBER_TOPUP, None, details, None, &result)
            .await;
        result
    }

    pub async fn recent_webhooks(&self, limit: i64) -> Result<Vec<WebhookReceipt>, AdminError> {
        Ok(self.receipts.recent(limit.clamp(1, MAX_WEBHOOK_PAGE)).await?)
    }

    pub async fn provider_balance(&self) -> Result<ProviderBalance, AdminError> {
        Ok(self.orchestrator.provider().check_balance().await?)
    }

    fn check_challenge(&self, code: &str) -> Result<(), AdminError> {
        if self.guards.challenge.verify(code) {
            Ok(())
        } else {
            Err(AdminError::Unauthorized("invalid TOTP code".to_string()))
        }
    }

    async fn check_ceiling(&self, action: &str) -> Result<(), AdminError> {
        if self.guards.limiter.allow(action).await? {
            Ok(())
        } else {
            Err(AdminError::RateLimited {
                limit: self.guards.max_topups_per_hour,
            })
        }
    }

    async fn record<T>(
        &self,
        action: &str,
        order_id: Option<Uuid>,
        details: JsonValue,
        ip_address: Option<String>,
        result: &Result<T, AdminError>,
    ) {
        let error_message = result.as_ref().err().map(|e| e.to_string());
        self.record_entry(action, order_id, details, ip_address, error_message)
            .await;
    }

    async fn record_entry(
        &self,
        action: &str,
        order_id: Option<Uuid>,
        details: JsonValue,
        ip_address: Option<String>,
        error_message: Option<String>,
    ) {
        if let Some(reason) = &error_message {
            warn!(action, order_id = ?order_id, error = %reason, "Operator action rejected");
        }

        let entry = NewAuditEntry {
            action: action.to_string(),
            order_id,
            details,
            ip_address,
            success: error_message.is_none(),
            error_message,
        };
        if let Err(e) = self.audit.record(entry).await {
            error!(action, order_id = ?order_id, error = %e, "Failed to write audit entry");
        }
    }
}

/// A topup only counts toward the hourly ceiling when the provider did not
/// fail it. Orders left `processing` still count.
fn dispatch_error(result: &Result<Order, AdminError>) -> Option<String> {
    match result {
        Ok(order) if order.status == OrderStatus::Failed => Some(format!(
            "provider failed order {}",
            order.ref_id
        )),
        Ok(_) => None,
        Err(e) => Some(e.to_string()),
    }
}
