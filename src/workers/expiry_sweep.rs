use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WorkerScheduleConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::{OrderStore, PaymentStore};
use crate::models::{OrderStatus, ProviderMeta};
use crate::services::order_lifecycle::OrderLifecycle;
use crate::services::reconciler::PaymentReconciler;

#[derive(Debug, Clone)]
pub struct ExpirySweepConfig {
    pub interval: Duration,
    /// `pending` orders that never got a payment are cancelled after this long
    pub pending_order_max_age: Duration,
    pub batch_size: i64,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            pending_order_max_age: Duration::from_secs(24 * 60 * 60),
            batch_size: 100,
        }
    }
}

impl From<&WorkerScheduleConfig> for ExpirySweepConfig {
    fn from(schedule: &WorkerScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(schedule.expiry_sweep_interval_secs),
            pending_order_max_age: Duration::from_secs(schedule.pending_order_max_age_secs),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub payments_expired: usize,
    pub orders_expired: usize,
    pub orders_cancelled: usize,
}

/// Expires lapsed payment instruments with their orders and cancels
/// abandoned `pending` orders. Every order write is a compare-and-set, so a
/// webhook that lands mid-sweep always wins.
pub struct ExpirySweepWorker {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    lifecycle: Arc<OrderLifecycle>,
    reconciler: Arc<PaymentReconciler>,
    config: ExpirySweepConfig,
}

impl ExpirySweepWorker {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        lifecycle: Arc<OrderLifecycle>,
        reconciler: Arc<PaymentReconciler>,
        config: ExpirySweepConfig,
    ) -> Self {
        Self {
            orders,
            payments,
            lifecycle,
            reconciler,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            pending_max_age_secs = self.config.pending_order_max_age.as_secs(),
            "expiry sweep worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("expiry sweep worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    match self.run_cycle().await {
                        Ok(stats) if stats != SweepStats::default() => {
                            info!(
                                payments_expired = stats.payments_expired,
                                orders_expired = stats.orders_expired,
                                orders_cancelled = stats.orders_cancelled,
                                "expiry sweep completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "expiry sweep cycle failed"),
                    }
                }
            }
        }

        info!("expiry sweep worker stopped");
    }

    pub async fn run_cycle(&self) -> Result<SweepStats, DatabaseError> {
        let mut stats = SweepStats::default();
        let now = Utc::now();

        let lapsed = self
            .payments
            .list_expired_pending(now, self.config.batch_size)
            .await?;
        for payment in lapsed {
            let order = match self.lifecycle.get_by_id(payment.order_id).await {
                Ok(order) => order,
                Err(e) => {
                    warn!(payment_id = %payment.id, error = %e, "Lapsed payment without a readable order");
                    continue;
                }
            };

            if order.status != OrderStatus::WaitingPayment {
                // The order moved on; only the instrument is closed
                match self.reconciler.mark_expired(&payment).await {
                    Ok(true) => stats.payments_expired += 1,
                    Ok(false) => {}
                    Err(e) => warn!(payment_id = %payment.id, error = %e, "Failed to expire payment"),
                }
                continue;
            }

            match self.reconciler.expire_lapsed(&order, &payment).await {
                Ok(expired) => {
                    stats.payments_expired += 1;
                    if expired.is_some() {
                        stats.orders_expired += 1;
                    }
                }
                Err(e) => warn!(ref_id = %order.ref_id, error = %e, "Failed to expire order"),
            }
        }

        let max_age = ChronoDuration::from_std(self.config.pending_order_max_age)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        let abandoned = self
            .orders
            .list_by_status_before(OrderStatus::Pending, now - max_age, self.config.batch_size)
            .await?;
        for order in abandoned {
            match self
                .lifecycle
                .transition_from(
                    order.id,
                    OrderStatus::Pending,
                    OrderStatus::Cancelled,
                    ProviderMeta::message("pesanan kadaluwarsa tanpa pembayaran"),
                )
                .await
            {
                Ok(Some(_)) => {
                    debug!(ref_id = %order.ref_id, "Abandoned order cancelled");
                    stats.orders_cancelled += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(ref_id = %order.ref_id, error = %e, "Failed to cancel abandoned order"),
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ExpirySweepConfig::default();
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.pending_order_max_age, Duration::from_secs(86_400));
        assert!(cfg.batch_size > 0);
    }

    #[test]
    fn schedule_comes_from_app_config() {
        let schedule = WorkerScheduleConfig {
            expiry_sweep_interval_secs: 15,
            pending_order_max_age_secs: 3600,
            ..WorkerScheduleConfig::default()
        };
        let cfg = ExpirySweepConfig::from(&schedule);
        assert_eq!(cfg.interval, Duration::from_secs(15));
        assert_eq!(cfg.pending_order_max_age, Duration::from_secs(3600));
        assert_eq!(cfg.batch_size, ExpirySweepConfig::default().batch_size);
    }
}
