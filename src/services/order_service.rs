//! Customer-facing order operations: create from the catalog, issue a payment
//! instrument, cancel, poll status, and member balance purchases.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PricingConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::{CatalogStore, PaymentStore};
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::models::{
    member_ref_id, web_ref_id, NewOrder, NewPayment, Order, OrderSource, OrderStatus, Payment,
    PaymentMethod, PaymentStatus, Product, ProviderMeta,
};
use crate::payments::{CreatePaymentRequest, PaymentError};
use crate::services::balance::{LedgerError, LedgerService};
use crate::services::order_lifecycle::{LifecycleError, OrderLifecycle};
use crate::services::reconciler::{PaymentReconciler, ReconcileError};
use crate::services::topup_orchestrator::{TopupError, TopupOrchestrator};

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("product {sku} not found")]
    ProductNotFound { sku: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Gateway(#[from] PaymentError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Topup(#[from] TopupError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl OrderServiceError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        OrderServiceError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<OrderServiceError> for AppError {
    fn from(err: OrderServiceError) -> Self {
        match err {
            OrderServiceError::Validation { field, reason } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field,
                    reason,
                }))
            }
            OrderServiceError::ProductNotFound { sku } => AppError::not_found("product", sku),
            OrderServiceError::Lifecycle(e) => e.into(),
            OrderServiceError::Gateway(e) => e.into(),
            OrderServiceError::Reconcile(e) => e.into(),
            OrderServiceError::Topup(e) => e.into(),
            OrderServiceError::Ledger(e) => e.into(),
            OrderServiceError::Database(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub buyer_sku_code: String,
    pub customer_no: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayOrderRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberOrderRequest {
    pub buyer_sku_code: String,
    pub customer_no: String,
}

/// Order plus its most recent payment, as shown to the customer
#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: Order,
    pub payment: Option<Payment>,
}

pub struct OrderService {
    lifecycle: Arc<OrderLifecycle>,
    reconciler: Arc<PaymentReconciler>,
    orchestrator: Arc<TopupOrchestrator>,
    ledger: Arc<LedgerService>,
    catalog: Arc<dyn CatalogStore>,
    payments: Arc<dyn PaymentStore>,
    pricing: PricingConfig,
}

impl OrderService {
    pub fn new(
        lifecycle: Arc<OrderLifecycle>,
        reconciler: Arc<PaymentReconciler>,
        orchestrator: Arc<TopupOrchestrator>,
        ledger: Arc<LedgerService>,
        catalog: Arc<dyn CatalogStore>,
        payments: Arc<dyn PaymentStore>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            lifecycle,
            reconciler,
            orchestrator,
            ledger,
            catalog,
            payments,
            pricing,
        }
    }

    /// New `pending` storefront order priced from the catalog
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderServiceError> {
        let product = self.available_product(&request.buyer_sku_code).await?;
        let price = product.web_price(&self.pricing.web_admin_fee);

        let order = self
            .lifecycle
            .create(NewOrder {
                ref_id: web_ref_id(Utc::now()),
                buyer_sku_code: product.buyer_sku_code.clone(),
                product_name: product.name.clone(),
                customer_no: request.customer_no.trim().to_string(),
                buy_price: product.buy_price.clone(),
                selling_price: price,
                customer_name: non_empty(request.customer_name),
                customer_email: non_empty(request.customer_email),
                customer_phone: non_empty(request.customer_phone),
                order_source: OrderSource::Web,
                admin_notes: None,
                member_id: None,
                member_price: None,
            })
            .await?;

        info!(ref_id = %order.ref_id, sku = %order.buyer_sku_code, price = %order.selling_price, "Order created");
        Ok(order)
    }

    /// Issues a payment instrument. An unexpired pending payment is returned as is.
    pub async fn pay(
        &self,
        order_id: Uuid,
        request: PayOrderRequest,
    ) -> Result<OrderView, OrderServiceError> {
        let order = self.lifecycle.get_by_id(order_id).await?;
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::WaitingPayment) {
            return Err(OrderServiceError::validation(
                "status",
                format!("order is {}, payment is no longer possible", order.status),
            ));
        }

        let now = Utc::now();
        if let Some(active) = self
            .payments
            .find_latest_for_order(order.id)
            .await?
            .filter(|p| p.status == PaymentStatus::Pending)
        {
            if !active.is_past_expiry(now) {
                debug!(ref_id = %order.ref_id, payment_id = %active.id, "Reusing active payment");
                return Ok(OrderView {
                    order,
                    payment: Some(active),
                });
            }
            self.reconciler.mark_expired(&active).await?;
        }

        let gateway = self.reconciler.gateways().for_method(request.payment_method);
        let instrument = gateway
            .create_payment(&CreatePaymentRequest {
                ref_id: order.ref_id.clone(),
                amount: order.selling_price.clone(),
                method: request.payment_method,
                customer_name: order.customer_name.clone(),
                customer_phone: order.customer_phone.clone(),
            })
            .await?;

        let payment = self
            .payments
            .insert(NewPayment {
                order_id: order.id,
                amount: order.selling_price.clone(),
                fee: instrument.fee,
                total_payment: instrument.total_payment,
                payment_method: request.payment_method,
                payment_number: instrument.payment_number,
                gateway_reference: instrument.gateway_reference,
                qr_image_url: instrument.qr_image_url,
                expired_at: instrument.expired_at,
            })
            .await?;

        let order = if order.status == OrderStatus::Pending {
            match self
                .lifecycle
                .transition_from(
                    order.id,
                    OrderStatus::Pending,
                    OrderStatus::WaitingPayment,
                    ProviderMeta::default(),
                )
                .await?
            {
                Some(order) => order,
                None => self.lifecycle.get_by_id(order.id).await?,
            }
        } else {
            order
        };

        info!(
            ref_id = %order.ref_id,
            method = request.payment_method.as_str(),
            expired_at = %payment.expired_at,
            "Payment instrument issued"
        );
        Ok(OrderView {
            order,
            payment: Some(payment),
        })
    }

    /// Cancels an unpaid order and its active payment
    pub async fn cancel(&self, order_id: Uuid) -> Result<Order, OrderServiceError> {
        let order = self.lifecycle.get_by_id(order_id).await?;
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::WaitingPayment) {
            return Err(OrderServiceError::validation(
                "status",
                format!("order is {} and can no longer be cancelled", order.status),
            ));
        }

        if let Some(payment) = self
            .payments
            .find_latest_for_order(order.id)
            .await?
            .filter(|p| p.status == PaymentStatus::Pending)
        {
            let gateway = self.reconciler.gateways().for_method(payment.payment_method);
            if let Err(e) = gateway
                .cancel_payment(&PaymentReconciler::query_for(&order, &payment))
                .await
            {
                warn!(ref_id = %order.ref_id, error = %e, "Gateway cancel failed, cancelling locally");
            }
            self.payments
                .compare_and_set_status(
                    payment.id,
                    PaymentStatus::Pending,
                    PaymentStatus::Cancelled,
                    None,
                )
                .await?;
        }

        let cancelled = self
            .lifecycle
            .transition_from(
                order.id,
                order.status,
                OrderStatus::Cancelled,
                ProviderMeta::default(),
            )
            .await?;

        match cancelled {
            Some(order) => {
                info!(ref_id = %order.ref_id, "Order cancelled");
                Ok(order)
            }
            None => {
                let current = self.lifecycle.get_by_id(order.id).await?;
                Err(LifecycleError::InvalidTransition {
                    order_id: current.id,
                    from: current.status,
                    to: OrderStatus::Cancelled,
                }
                .into())
            }
        }
    }

    /// Current state; a waiting order first polls its gateway
    pub async fn status(&self, order_id: Uuid) -> Result<OrderView, OrderServiceError> {
        let order = self.lifecycle.get_by_id(order_id).await?;
        self.refresh(order).await
    }

    pub async fn status_by_ref(&self, ref_id: &str) -> Result<OrderView, OrderServiceError> {
        let order = self.lifecycle.get_by_ref_id(ref_id).await?;
        self.refresh(order).await
    }

    async fn refresh(&self, order: Order) -> Result<OrderView, OrderServiceError> {
        if order.status != OrderStatus::WaitingPayment {
            let payment = self.payments.find_latest_for_order(order.id).await?;
            return Ok(OrderView { order, payment });
        }

        let payment = self.reconciler.poll_gateway(&order).await?;
        let order = self.lifecycle.get_by_id(order.id).await?;
        Ok(OrderView { order, payment })
    }

    /// Balance purchase at the member price, fulfilled immediately
    pub async fn member_purchase(
        &self,
        member_id: Uuid,
        request: MemberOrderRequest,
    ) -> Result<Order, OrderServiceError> {
        let product = self.available_product(&request.buyer_sku_code).await?;
        let price = product.member_price_or_selling();

        let order = self
            .orchestrator
            .purchase_with_balance(
                member_id,
                NewOrder {
                    ref_id: member_ref_id(Utc::now()),
                    buyer_sku_code: product.buyer_sku_code.clone(),
                    product_name: product.name.clone(),
                    customer_no: request.customer_no.trim().to_string(),
                    buy_price: product.buy_price.clone(),
                    selling_price: price.clone(),
                    customer_name: None,
                    customer_email: None,
                    customer_phone: None,
                    order_source: OrderSource::Member,
                    admin_notes: None,
                    member_id: Some(member_id),
                    member_price: Some(price),
                },
            )
            .await?;

        Ok(order)
    }

    pub async fn member_balance(&self, member_id: Uuid) -> Result<BigDecimal, OrderServiceError> {
        Ok(self.ledger.balance(member_id).await?)
    }

    async fn available_product(&self, sku: &str) -> Result<Product, OrderServiceError> {
        let sku = sku.trim();
        if sku.is_empty() {
            return Err(OrderServiceError::validation("buyer_sku_code", "must not be empty"));
        }

        let product = self
            .catalog
            .get_by_sku(sku)
            .await?
            .ok_or_else(|| OrderServiceError::ProductNotFound {
                sku: sku.to_string(),
            })?;
        if !product.is_available {
            return Err(OrderServiceError::validation(
                "buyer_sku_code",
                format!("{} is currently unavailable", product.name),
            ));
        }
        Ok(product)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
