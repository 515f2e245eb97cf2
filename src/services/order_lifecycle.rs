//! Order Lifecycle Manager: the only place order status is written.
//!
//! Every status write is a compare-and-set on the row's current status, so
//! two concurrent writers can never both apply the same edge.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::OrderStore;
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::models::{NewOrder, Order, OrderStatus, ProviderMeta};

/// Concurrent writers can make the CAS lose; re-read and re-decide this many times
const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid order field {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("order with ref_id {ref_id} already exists")]
    Conflict { ref_id: String },

    #[error("order {id} not found")]
    NotFound { id: String },

    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Status kept changing underneath us
    #[error("order {order_id} is contended")]
    Contended { order_id: Uuid },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation { field, reason } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field,
                    reason,
                }))
            }
            LifecycleError::Conflict { ref_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::Conflict {
                    entity: "order".to_string(),
                    id: ref_id,
                }))
            }
            LifecycleError::NotFound { id } => AppError::not_found("order", id),
            LifecycleError::InvalidTransition { order_id, from, to } => {
                AppError::new(AppErrorKind::Domain(DomainError::InvalidTransition {
                    order_id: order_id.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                }))
            }
            LifecycleError::Contended { order_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::Conflict {
                    entity: "order".to_string(),
                    id: order_id.to_string(),
                }))
            }
            LifecycleError::Database(e) => e.into(),
        }
    }
}

/// Result of a transition request
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// This call moved the order
    Applied(Order),
    /// The order already had the requested status; at most metadata changed
    Unchanged(Order),
}

impl TransitionOutcome {
    pub fn order(&self) -> &Order {
        match self {
            TransitionOutcome::Applied(order) | TransitionOutcome::Unchanged(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            TransitionOutcome::Applied(order) | TransitionOutcome::Unchanged(order) => order,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

pub struct OrderLifecycle {
    orders: Arc<dyn OrderStore>,
}

impl OrderLifecycle {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    pub async fn create(&self, order: NewOrder) -> Result<Order, LifecycleError> {
        if order.buyer_sku_code.trim().is_empty() {
            return Err(LifecycleError::Validation {
                field: "buyer_sku_code".to_string(),
                reason: "is required".to_string(),
            });
        }
        if order.customer_no.trim().is_empty() {
            return Err(LifecycleError::Validation {
                field: "customer_no".to_string(),
                reason: "is required".to_string(),
            });
        }

        let ref_id = order.ref_id.clone();
        let created = self.orders.insert(order).await.map_err(|e| {
            if e.is_unique_violation() {
                LifecycleError::Conflict {
                    ref_id: ref_id.clone(),
                }
            } else {
                LifecycleError::Database(e)
            }
        })?;

        info!(
            order_id = %created.id,
            ref_id = %created.ref_id,
            source = created.order_source.as_str(),
            "Order created"
        );
        Ok(created)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Order, LifecycleError> {
        self.orders
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound { id: id.to_string() })
    }

    pub async fn get_by_ref_id(&self, ref_id: &str) -> Result<Order, LifecycleError> {
        self.orders
            .find_by_ref_id(ref_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound {
                id: ref_id.to_string(),
            })
    }

    /// Resolves a provider callback id, which differs from `ref_id` after a manual retry
    pub async fn get_by_provider_ref_id(&self, provider_ref_id: &str) -> Result<Order, LifecycleError> {
        self.orders
            .find_by_provider_ref_id(provider_ref_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound {
                id: provider_ref_id.to_string(),
            })
    }

    /// Moves the order to `next` from whatever legal status it is in.
    ///
    /// Re-applying the current status of a non-terminal order only writes
    /// `meta`; on a terminal order it is a no-op. Both report `Unchanged`.
    pub async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        meta: ProviderMeta,
    ) -> Result<TransitionOutcome, LifecycleError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get_by_id(order_id).await?;

            if current.status == next {
                if current.status.is_terminal() || meta.is_empty() {
                    debug!(order_id = %order_id, status = %next, "Transition already applied");
                    return Ok(TransitionOutcome::Unchanged(current));
                }
                match self
                    .orders
                    .compare_and_set_status(order_id, next, next, &meta, None)
                    .await?
                {
                    Some(updated) => return Ok(TransitionOutcome::Unchanged(updated)),
                    None => continue,
                }
            }

            if !current.status.can_transition_to(next) {
                warn!(
                    order_id = %order_id,
                    ref_id = %current.ref_id,
                    from = %current.status,
                    to = %next,
                    "Rejected illegal order transition"
                );
                return Err(LifecycleError::InvalidTransition {
                    order_id,
                    from: current.status,
                    to: next,
                });
            }

            if let Some(updated) = self.cas(&current, next, &meta).await? {
                return Ok(TransitionOutcome::Applied(updated));
            }
        }

        Err(LifecycleError::Contended { order_id })
    }

    /// Applies `expected -> next` only while the order is still in `expected`.
    /// `None` means the order has moved on and nothing was written.
    pub async fn transition_from(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        meta: ProviderMeta,
    ) -> Result<Option<Order>, LifecycleError> {
        if !expected.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                order_id,
                from: expected,
                to: next,
            });
        }

        let current = self.get_by_id(order_id).await?;
        if current.status != expected {
            return Ok(None);
        }
        self.cas(&current, next, &meta).await
    }

    /// Operator edge `failed -> processing` under a fresh provider ref id
    pub async fn reopen_for_retry(
        &self,
        order: &Order,
        provider_ref_id: &str,
        customer_no: &str,
    ) -> Result<Order, LifecycleError> {
        if !order.status.operator_retry_allowed() {
            return Err(LifecycleError::InvalidTransition {
                order_id: order.id,
                from: order.status,
                to: OrderStatus::Processing,
            });
        }

        let reopened = self
            .orders
            .reopen_for_retry(order.id, provider_ref_id, customer_no)
            .await?
            .ok_or(LifecycleError::Contended { order_id: order.id })?;

        info!(
            order_id = %order.id,
            ref_id = %order.ref_id,
            provider_ref_id = %provider_ref_id,
            "Order reopened for manual retry"
        );
        Ok(reopened)
    }

    async fn cas(
        &self,
        current: &Order,
        next: OrderStatus,
        meta: &ProviderMeta,
    ) -> Result<Option<Order>, LifecycleError> {
        let completed_at = matches!(next, OrderStatus::Success | OrderStatus::Failed)
            .then(Utc::now);

        let updated = self
            .orders
            .compare_and_set_status(current.id, current.status, next, meta, completed_at)
            .await?;

        if let Some(order) = &updated {
            info!(
                order_id = %order.id,
                ref_id = %order.ref_id,
                from = %current.status,
                to = %next,
                "Order transitioned"
            );
        }
        Ok(updated)
    }
}
