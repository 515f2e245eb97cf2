//! Payment-side reconciliation shared by webhooks, status polling, operator
//! checks and the expiry sweep.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::error::DatabaseError;
use crate::database::repository::PaymentStore;
use crate::error::AppError;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus, ProviderMeta};
use crate::payments::{GatewayPaymentStatus, GatewayRegistry, PaymentError, PaymentQuery};
use crate::services::order_lifecycle::{LifecycleError, OrderLifecycle};
use crate::services::topup_orchestrator::TopupOrchestrator;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Gateway(#[from] PaymentError),
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Lifecycle(e) => e.into(),
            ReconcileError::Database(e) => e.into(),
            ReconcileError::Gateway(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Settlement {
    /// This call moved the order to `paid` and handed it to fulfillment
    Claimed(Order),
    /// The order had already been settled by an earlier delivery
    AlreadySettled(Order),
}

impl Settlement {
    pub fn order(&self) -> &Order {
        match self {
            Settlement::Claimed(order) | Settlement::AlreadySettled(order) => order,
        }
    }
}

/// Statuses an order can only be in after its payment was accepted
fn settled_status(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Paid
            | OrderStatus::Processing
            | OrderStatus::Success
            | OrderStatus::Failed
            | OrderStatus::Refunded
    )
}

pub struct PaymentReconciler {
    lifecycle: Arc<OrderLifecycle>,
    payments: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
    orchestrator: Arc<TopupOrchestrator>,
}

impl PaymentReconciler {
    pub fn new(
        lifecycle: Arc<OrderLifecycle>,
        payments: Arc<dyn PaymentStore>,
        gateways: GatewayRegistry,
        orchestrator: Arc<TopupOrchestrator>,
    ) -> Self {
        Self {
            lifecycle,
            payments,
            gateways,
            orchestrator,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub async fn latest_payment(&self, order: &Order) -> Result<Option<Payment>, ReconcileError> {
        Ok(self.payments.find_latest_for_order(order.id).await?)
    }

    /// Payment completed: mark it, flip the order `waiting_payment -> paid`
    /// and, only if this call won that flip, start fulfillment.
    pub async fn settle_paid(
        &self,
        order: &Order,
        payment: Option<&Payment>,
    ) -> Result<Settlement, ReconcileError> {
        if let Some(payment) = payment.filter(|p| p.status == PaymentStatus::Pending) {
            let updated = self
                .payments
                .compare_and_set_status(
                    payment.id,
                    PaymentStatus::Pending,
                    PaymentStatus::Completed,
                    Some(Utc::now()),
                )
                .await?;
            if updated.is_some() {
                info!(ref_id = %order.ref_id, payment_id = %payment.id, "Payment completed");
            }
        }

        match self
            .lifecycle
            .transition(order.id, OrderStatus::Paid, ProviderMeta::default())
            .await
        {
            Ok(outcome) if outcome.was_applied() => {
                let order = outcome.into_order();
                self.orchestrator.spawn_fulfillment(order.id);
                Ok(Settlement::Claimed(order))
            }
            Ok(outcome) => Ok(Settlement::AlreadySettled(outcome.into_order())),
            Err(LifecycleError::InvalidTransition { .. }) => {
                let current = self.lifecycle.get_by_id(order.id).await?;
                if settled_status(current.status) {
                    debug!(ref_id = %current.ref_id, status = %current.status, "Duplicate payment notice");
                    Ok(Settlement::AlreadySettled(current))
                } else {
                    warn!(
                        ref_id = %current.ref_id,
                        status = %current.status,
                        "Payment received for an order that is no longer payable"
                    );
                    Err(LifecycleError::InvalidTransition {
                        order_id: current.id,
                        from: current.status,
                        to: OrderStatus::Paid,
                    }
                    .into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gateway reported the instrument lapsed. The order is left for the sweep.
    pub async fn mark_expired(&self, payment: &Payment) -> Result<bool, ReconcileError> {
        let updated = self
            .payments
            .compare_and_set_status(
                payment.id,
                PaymentStatus::Pending,
                PaymentStatus::Expired,
                None,
            )
            .await?;
        Ok(updated.is_some())
    }

    /// Past `expired_at`: cancel upstream (best effort), expire the payment,
    /// then `waiting_payment -> expired` by compare-and-set.
    pub async fn expire_lapsed(
        &self,
        order: &Order,
        payment: &Payment,
    ) -> Result<Option<Order>, ReconcileError> {
        let gateway = self.gateways.for_method(payment.payment_method);
        if let Err(e) = gateway.cancel_payment(&Self::query_for(order, payment)).await {
            debug!(ref_id = %order.ref_id, error = %e, "Gateway cancel failed, expiring locally");
        }

        self.mark_expired(payment).await?;

        let expired = self
            .lifecycle
            .transition_from(
                order.id,
                OrderStatus::WaitingPayment,
                OrderStatus::Expired,
                ProviderMeta::default(),
            )
            .await?;
        if expired.is_some() {
            info!(ref_id = %order.ref_id, "Order expired with its payment");
        }
        Ok(expired)
    }

    /// Active status poll for an order still waiting on its payment
    pub async fn poll_gateway(&self, order: &Order) -> Result<Option<Payment>, ReconcileError> {
        let Some(payment) = self.latest_payment(order).await? else {
            return Ok(None);
        };
        if payment.status != PaymentStatus::Pending || order.status != OrderStatus::WaitingPayment {
            return Ok(Some(payment));
        }

        let gateway = self.gateways.for_method(payment.payment_method);
        match gateway
            .get_payment_detail(&Self::query_for(order, &payment))
            .await
        {
            Ok(GatewayPaymentStatus::Completed) => {
                self.settle_paid(order, Some(&payment)).await?;
            }
            Ok(GatewayPaymentStatus::Expired) => {
                self.mark_expired(&payment).await?;
            }
            Ok(GatewayPaymentStatus::Pending) => return Ok(Some(payment)),
            Err(e) => {
                warn!(ref_id = %order.ref_id, error = %e, "Gateway status poll failed");
                return Ok(Some(payment));
            }
        }

        Ok(self.latest_payment(order).await?)
    }

    pub fn query_for(order: &Order, payment: &Payment) -> PaymentQuery {
        PaymentQuery {
            ref_id: order.ref_id.clone(),
            amount: payment.amount.clone(),
            gateway_reference: payment.gateway_reference.clone(),
        }
    }
}
