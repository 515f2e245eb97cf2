//! Topup Orchestrator: drives a paid order through the fulfillment provider
//! and owns the refund-on-failure rule for balance-funded orders.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::fulfillment::{
    FulfillmentError, FulfillmentOutcome, FulfillmentProvider, ProviderCallback, ProviderResult,
    TopupRequest,
};
use crate::models::{retry_ref_id, NewOrder, Order, OrderStatus, ProviderMeta};
use crate::services::balance::{LedgerError, LedgerService};
use crate::services::order_lifecycle::{LifecycleError, OrderLifecycle};

#[derive(Debug, Error)]
pub enum TopupError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },
}

impl From<TopupError> for AppError {
    fn from(err: TopupError) -> Self {
        match err {
            TopupError::Lifecycle(e) => e.into(),
            TopupError::Ledger(e) => e.into(),
            TopupError::Fulfillment(e) => e.into(),
            TopupError::Database(e) => e.into(),
            TopupError::Validation { field, reason } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field,
                    reason,
                }))
            }
        }
    }
}

/// What to do when the provider cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportPolicy {
    /// First dispatch: nothing was acknowledged, so the order fails
    FailOrder,
    /// Re-check of a pending order: the provider may still deliver
    KeepProcessing,
}

#[derive(Debug, Clone)]
pub enum CallbackDisposition {
    Applied(Order),
    /// Unknown id (e.g. validation probes) or an order no longer in flight
    Ignored { ref_id: String, reason: String },
}

pub struct TopupOrchestrator {
    lifecycle: Arc<OrderLifecycle>,
    ledger: Arc<LedgerService>,
    provider: Arc<dyn FulfillmentProvider>,
}

impl TopupOrchestrator {
    pub fn new(
        lifecycle: Arc<OrderLifecycle>,
        ledger: Arc<LedgerService>,
        provider: Arc<dyn FulfillmentProvider>,
    ) -> Self {
        Self {
            lifecycle,
            ledger,
            provider,
        }
    }

    pub fn provider(&self) -> &Arc<dyn FulfillmentProvider> {
        &self.provider
    }

    /// Detached hand-off used by the webhook path; the caller never waits on the provider
    pub fn spawn_fulfillment(self: &Arc<Self>, order_id: Uuid) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.fulfill_paid_order(order_id).await {
                error!(order_id = %order_id, error = %e, "Background fulfillment failed");
            }
        })
    }

    /// Claims a `paid` order with `paid -> processing` and calls the provider.
    /// Returns `None` when another task already claimed it.
    pub async fn fulfill_paid_order(&self, order_id: Uuid) -> Result<Option<Order>, TopupError> {
        let claimed = self
            .lifecycle
            .transition_from(
                order_id,
                OrderStatus::Paid,
                OrderStatus::Processing,
                ProviderMeta::default(),
            )
            .await?;

        let Some(order) = claimed else {
            debug!(order_id = %order_id, "Paid order already claimed");
            return Ok(None);
        };

        self.dispatch(order).await.map(Some)
    }

    /// Sends a `processing` order to the provider and records the answer
    pub async fn dispatch(&self, order: Order) -> Result<Order, TopupError> {
        let result = self.provider.topup(&Self::request_for(&order)).await;
        self.apply_result(&order, result, TransportPolicy::FailOrder)
            .await
    }

    /// Resends the same provider ref id; the provider answers with the current state
    pub async fn recheck(&self, order: Order) -> Result<Order, TopupError> {
        if order.status != OrderStatus::Processing {
            return Ok(order);
        }
        let result = self.provider.topup(&Self::request_for(&order)).await;
        self.apply_result(&order, result, TransportPolicy::KeepProcessing)
            .await
    }

    /// Orders paid up front (member balance, operator cash or gift):
    /// created in `pending` and moved straight to `processing`.
    pub async fn open_prepaid_order(&self, new_order: NewOrder) -> Result<Order, TopupError> {
        let created = self.lifecycle.create(new_order).await?;
        let outcome = self
            .lifecycle
            .transition(created.id, OrderStatus::Processing, ProviderMeta::default())
            .await?;
        Ok(outcome.into_order())
    }

    /// Debit, create, dispatch. A failure to create the order returns the debit.
    pub async fn purchase_with_balance(
        &self,
        member_id: Uuid,
        new_order: NewOrder,
    ) -> Result<Order, TopupError> {
        let price = new_order.member_price.clone().ok_or_else(|| TopupError::Validation {
            field: "member_price".to_string(),
            reason: "member orders need a frozen member price".to_string(),
        })?;
        let ref_id = new_order.ref_id.clone();
        let description = format!("Pembelian {} ({})", new_order.product_name, ref_id);

        self.ledger
            .debit(member_id, &price, description, &ref_id)
            .await?;

        let order = match self.open_prepaid_order(new_order).await {
            Ok(order) => order,
            Err(e) => {
                warn!(ref_id = %ref_id, error = %e, "Member order could not be opened, returning debit");
                if let Err(credit_err) = self
                    .ledger
                    .credit(member_id, &price, format!("Refund Gagal System {}", ref_id), "system")
                    .await
                {
                    error!(
                        critical = true,
                        member_id = %member_id,
                        ref_id = %ref_id,
                        amount = %price,
                        error = %credit_err,
                        "Compensating credit failed after debit"
                    );
                }
                return Err(e);
            }
        };

        self.dispatch(order).await
    }

    /// Operator retry of a `failed` order under a fresh provider ref id
    pub async fn manual_retry(
        &self,
        order: &Order,
        customer_no: Option<&str>,
    ) -> Result<Order, TopupError> {
        if order.member_id.is_some() {
            return Err(TopupError::Validation {
                field: "order".to_string(),
                reason: "balance-funded orders were already refunded".to_string(),
            });
        }

        let provider_ref_id = retry_ref_id(Utc::now());
        let customer_no = customer_no
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(order.customer_no.as_str());

        let reopened = self
            .lifecycle
            .reopen_for_retry(order, &provider_ref_id, customer_no)
            .await?;
        self.dispatch(reopened).await
    }

    /// Resolves an in-flight order from a provider push
    pub async fn apply_callback(
        &self,
        callback: ProviderCallback,
    ) -> Result<CallbackDisposition, TopupError> {
        let order = match self.lifecycle.get_by_provider_ref_id(&callback.ref_id).await {
            Ok(order) => order,
            Err(LifecycleError::NotFound { .. }) => {
                return Ok(CallbackDisposition::Ignored {
                    ref_id: callback.ref_id,
                    reason: "unknown ref_id".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if order.status != OrderStatus::Processing {
            return Ok(CallbackDisposition::Ignored {
                ref_id: callback.ref_id,
                reason: format!("order is {}", order.status),
            });
        }

        let order = self
            .apply_result(&order, Ok(callback.result), TransportPolicy::FailOrder)
            .await?;
        Ok(CallbackDisposition::Applied(order))
    }

    fn request_for(order: &Order) -> TopupRequest {
        TopupRequest {
            ref_id: order.provider_ref_id.clone(),
            buyer_sku_code: order.buyer_sku_code.clone(),
            customer_no: order.customer_no.clone(),
        }
    }

    async fn apply_result(
        &self,
        order: &Order,
        result: Result<ProviderResult, FulfillmentError>,
        policy: TransportPolicy,
    ) -> Result<Order, TopupError> {
        let result = match result {
            Ok(result) => result,
            Err(e) if policy == TransportPolicy::KeepProcessing => {
                warn!(ref_id = %order.ref_id, error = %e, "Re-check could not reach provider");
                return Ok(order.clone());
            }
            Err(e) => {
                warn!(ref_id = %order.ref_id, error = %e, "Provider call failed, failing order");
                return self
                    .fail(order, ProviderMeta::message(format!("provider error: {}", e)))
                    .await;
            }
        };

        match &result.outcome {
            FulfillmentOutcome::Success { .. } => {
                self.settle(order, OrderStatus::Success, result.meta()).await
            }
            FulfillmentOutcome::Pending => {
                self.settle(order, OrderStatus::Processing, result.meta())
                    .await
            }
            FulfillmentOutcome::Failed => self.fail(order, result.meta()).await,
        }
    }

    async fn fail(&self, order: &Order, meta: ProviderMeta) -> Result<Order, TopupError> {
        let outcome = match self
            .lifecycle
            .transition(order.id, OrderStatus::Failed, meta)
            .await
        {
            Ok(outcome) => outcome,
            Err(LifecycleError::InvalidTransition { .. }) => {
                return Ok(self.lifecycle.get_by_id(order.id).await?);
            }
            Err(e) => return Err(e.into()),
        };

        // Only the call that flipped the order refunds it
        if outcome.was_applied() {
            self.refund_if_member_funded(outcome.order()).await;
        }
        Ok(outcome.into_order())
    }

    /// Writes a non-failure outcome; a late answer for an order that already
    /// reached a terminal state is dropped.
    async fn settle(
        &self,
        order: &Order,
        next: OrderStatus,
        meta: ProviderMeta,
    ) -> Result<Order, TopupError> {
        match self.lifecycle.transition(order.id, next, meta).await {
            Ok(outcome) => {
                let order = outcome.into_order();
                if order.status == OrderStatus::Success {
                    info!(ref_id = %order.ref_id, serial = ?order.serial_number, "Topup delivered");
                }
                Ok(order)
            }
            Err(LifecycleError::InvalidTransition { .. }) => {
                Ok(self.lifecycle.get_by_id(order.id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refund_if_member_funded(&self, order: &Order) {
        let Some((member_id, amount)) = order.refundable_amount() else {
            return;
        };

        let description = format!("Refund Gagal Transaksi {}", order.ref_id);
        match self
            .ledger
            .refund(member_id, &amount, description, &order.ref_id)
            .await
        {
            Ok(receipt) => info!(
                ref_id = %order.ref_id,
                member_id = %member_id,
                amount = %amount,
                balance_after = %receipt.balance_after,
                "Member refunded for failed order"
            ),
            Err(e) => error!(
                critical = true,
                ref_id = %order.ref_id,
                member_id = %member_id,
                amount = %amount,
                error = %e,
                "Refund failed, member balance not restored"
            ),
        }
    }
}
