use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::ReceiptStore;
use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError, ValidationError};
use crate::models::{OrderStatus, PaymentStatus};
use crate::payments::utils::truncate_amount;
use crate::payments::GatewayPaymentStatus;
use crate::services::order_lifecycle::{LifecycleError, OrderLifecycle};
use crate::services::reconciler::{PaymentReconciler, ReconcileError, Settlement};
use crate::services::topup_orchestrator::{CallbackDisposition, TopupError, TopupOrchestrator};

/// Receipt source for fulfillment provider callbacks
pub const PROVIDER_SOURCE: &str = "digiflazz";

/// Ref ids that belong to account-validation probes, never to orders
const PROBE_PREFIXES: &[&str] = &["VAL-"];

#[derive(Debug, Error)]
pub enum WebhookError {
    /// The delivery could not even be logged; the sender should retry
    #[error("webhook receipt could not be stored: {0}")]
    ReceiptUnavailable(DatabaseError),

    #[error("unknown webhook source: {0}")]
    UnknownSource(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("order {ref_id} not found")]
    OrderNotFound { ref_id: String },

    #[error("amount mismatch for {ref_id}: expected {expected}, received {received}")]
    AmountMismatch {
        ref_id: String,
        expected: String,
        received: String,
    },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Topup(#[from] TopupError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::ReceiptUnavailable(e) => {
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message: e.to_string(),
                    is_retryable: true,
                }))
            }
            WebhookError::UnknownSource(source) => AppError::not_found("webhook source", source),
            WebhookError::Malformed(reason) => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field: "payload".to_string(),
                    reason,
                }))
            }
            WebhookError::Unauthorized(reason) => AppError::unauthorized(reason),
            WebhookError::OrderNotFound { ref_id } => AppError::not_found("order", ref_id),
            WebhookError::AmountMismatch {
                ref_id,
                expected,
                received,
            } => AppError::new(AppErrorKind::Domain(DomainError::AmountMismatch {
                ref_id,
                expected,
                received,
            })),
            WebhookError::Reconcile(e) => e.into(),
            WebhookError::Topup(e) => e.into(),
            WebhookError::Lifecycle(e) => e.into(),
        }
    }
}

/// What a processed delivery did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Order is paid; `claimed` is true only for the delivery that started fulfillment
    Settled { order_id: Uuid, claimed: bool },
    PaymentExpired { ref_id: String },
    ProviderResolved { order_id: Uuid, status: OrderStatus },
    Ignored { reason: String },
}

pub struct WebhookProcessor {
    receipts: Arc<dyn ReceiptStore>,
    lifecycle: Arc<OrderLifecycle>,
    reconciler: Arc<PaymentReconciler>,
    orchestrator: Arc<TopupOrchestrator>,
}

impl WebhookProcessor {
    pub fn new(
        receipts: Arc<dyn ReceiptStore>,
        lifecycle: Arc<OrderLifecycle>,
        reconciler: Arc<PaymentReconciler>,
        orchestrator: Arc<TopupOrchestrator>,
    ) -> Self {
        Self {
            receipts,
            lifecycle,
            reconciler,
            orchestrator,
        }
    }

    /// Payment gateway notification. The receipt is logged first and marked
    /// with the outcome last, whatever happens in between.
    pub async fn process_gateway_webhook(
        &self,
        source: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let receipt_id = self.log_receipt(source, body).await?;
        let result = self.handle_gateway(source, body, signature).await;
        self.finish(receipt_id, source, &result).await;
        result
    }

    /// Fulfillment provider push for an order in `processing`
    pub async fn process_provider_callback(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let receipt_id = self.log_receipt(PROVIDER_SOURCE, body).await?;
        let result = self.handle_provider(body, signature).await;
        self.finish(receipt_id, PROVIDER_SOURCE, &result).await;
        result
    }

    async fn log_receipt(&self, source: &str, body: &[u8]) -> Result<Uuid, WebhookError> {
        let payload = serde_json::from_slice::<JsonValue>(body).unwrap_or_else(|_| {
            serde_json::json!({ "raw": String::from_utf8_lossy(body) })
        });

        let receipt = self
            .receipts
            .log(source, payload)
            .await
            .map_err(WebhookError::ReceiptUnavailable)?;
        Ok(receipt.id)
    }

    async fn finish(
        &self,
        receipt_id: Uuid,
        source: &str,
        result: &Result<WebhookOutcome, WebhookError>,
    ) {
        let failure = match result {
            Ok(outcome) => {
                info!(receipt_id = %receipt_id, source, outcome = ?outcome, "Webhook processed");
                None
            }
            Err(e) => {
                warn!(receipt_id = %receipt_id, source, error = %e, "Webhook rejected");
                Some(e.to_string())
            }
        };

        if let Err(e) = self
            .receipts
            .mark_processed(receipt_id, failure.as_deref())
            .await
        {
            error!(receipt_id = %receipt_id, error = %e, "Failed to mark webhook receipt");
        }
    }

    async fn handle_gateway(
        &self,
        source: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let gateway = self
            .reconciler
            .gateways()
            .by_name(source)
            .map_err(|_| WebhookError::UnknownSource(source.to_string()))?;

        let event = gateway
            .parse_webhook_event(body)
            .map_err(|e| WebhookError::Malformed(e.to_string()))?;

        let verification = gateway
            .verify_webhook(body, signature)
            .map_err(|e| WebhookError::Unauthorized(e.to_string()))?;
        if !verification.valid {
            return Err(WebhookError::Unauthorized(
                verification
                    .reason
                    .unwrap_or_else(|| "verification failed".to_string()),
            ));
        }

        let order = match self.lifecycle.get_by_ref_id(&event.ref_id).await {
            Ok(order) => order,
            Err(LifecycleError::NotFound { .. }) if is_probe(&event.ref_id) => {
                return Ok(WebhookOutcome::Ignored {
                    reason: format!("non-order reference {}", event.ref_id),
                });
            }
            Err(LifecycleError::NotFound { .. }) => {
                return Err(WebhookError::OrderNotFound {
                    ref_id: event.ref_id,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let expected = truncate_amount(&order.selling_price);
        let received = truncate_amount(&event.amount);
        if expected.is_none() || expected != received {
            warn!(
                ref_id = %order.ref_id,
                expected = %order.selling_price,
                received = %event.amount,
                "Webhook amount does not match order"
            );
            return Err(WebhookError::AmountMismatch {
                ref_id: order.ref_id,
                expected: order.selling_price.to_string(),
                received: event.amount.to_string(),
            });
        }

        match event.status {
            Some(GatewayPaymentStatus::Completed) => {
                let payment = self.reconciler.latest_payment(&order).await?;
                let settlement = self.reconciler.settle_paid(&order, payment.as_ref()).await?;
                Ok(WebhookOutcome::Settled {
                    order_id: settlement.order().id,
                    claimed: matches!(settlement, Settlement::Claimed(_)),
                })
            }
            Some(GatewayPaymentStatus::Expired) => {
                if let Some(payment) = self
                    .reconciler
                    .latest_payment(&order)
                    .await?
                    .filter(|p| p.status == PaymentStatus::Pending)
                {
                    self.reconciler.mark_expired(&payment).await?;
                }
                Ok(WebhookOutcome::PaymentExpired {
                    ref_id: order.ref_id,
                })
            }
            Some(GatewayPaymentStatus::Pending) => Ok(WebhookOutcome::Ignored {
                reason: "payment still pending".to_string(),
            }),
            None => Ok(WebhookOutcome::Ignored {
                reason: format!("unhandled gateway status '{}'", event.raw_status),
            }),
        }
    }

    async fn handle_provider(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let provider = self.orchestrator.provider();
        if !provider.verify_callback(body, signature) {
            return Err(WebhookError::Unauthorized(
                "provider callback signature mismatch".to_string(),
            ));
        }

        let callback = provider
            .parse_callback(body)
            .map_err(|e| WebhookError::Malformed(e.to_string()))?;

        match self.orchestrator.apply_callback(callback).await? {
            CallbackDisposition::Applied(order) => Ok(WebhookOutcome::ProviderResolved {
                order_id: order.id,
                status: order.status,
            }),
            CallbackDisposition::Ignored { ref_id, reason } => Ok(WebhookOutcome::Ignored {
                reason: format!("{}: {}", ref_id, reason),
            }),
        }
    }
}

fn is_probe(ref_id: &str) -> bool {
    PROBE_PREFIXES.iter().any(|prefix| ref_id.starts_with(prefix))
}
