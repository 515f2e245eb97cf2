use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::WorkerScheduleConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::OrderStore;
use crate::models::OrderStatus;
use crate::services::topup_orchestrator::TopupOrchestrator;

#[derive(Debug, Clone)]
pub struct PaidResumeConfig {
    pub interval: Duration,
    /// A `paid` order untouched for this long lost its fulfillment task
    pub stuck_after: Duration,
    pub batch_size: i64,
}

impl Default for PaidResumeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stuck_after: Duration::from_secs(120),
            batch_size: 50,
        }
    }
}

impl From<&WorkerScheduleConfig> for PaidResumeConfig {
    fn from(schedule: &WorkerScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(schedule.paid_resume_interval_secs),
            stuck_after: Duration::from_secs(schedule.paid_stuck_after_secs),
            ..Self::default()
        }
    }
}

/// Picks up orders left in `paid` when the process died between the
/// payment webhook and the fulfillment hand-off.
pub struct PaidResumeWorker {
    orders: Arc<dyn OrderStore>,
    orchestrator: Arc<TopupOrchestrator>,
    config: PaidResumeConfig,
}

impl PaidResumeWorker {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        orchestrator: Arc<TopupOrchestrator>,
        config: PaidResumeConfig,
    ) -> Self {
        Self {
            orders,
            orchestrator,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            stuck_after_secs = self.config.stuck_after.as_secs(),
            "paid resume worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("paid resume worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    match self.run_cycle().await {
                        Ok(0) => {}
                        Ok(resumed) => info!(resumed, "stuck paid orders resumed"),
                        Err(e) => warn!(error = %e, "paid resume cycle failed"),
                    }
                }
            }
        }

        info!("paid resume worker stopped");
    }

    /// Number of orders this cycle claimed and dispatched
    pub async fn run_cycle(&self) -> Result<usize, DatabaseError> {
        let stuck_after = ChronoDuration::from_std(self.config.stuck_after)
            .unwrap_or_else(|_| ChronoDuration::minutes(2));
        let stuck = self
            .orders
            .list_by_status_before(
                OrderStatus::Paid,
                Utc::now() - stuck_after,
                self.config.batch_size,
            )
            .await?;

        let mut resumed = 0;
        for order in stuck {
            warn!(ref_id = %order.ref_id, paid_since = %order.updated_at, "Resuming stuck paid order");
            match self.orchestrator.fulfill_paid_order(order.id).await {
                Ok(Some(_)) => resumed += 1,
                Ok(None) => {}
                Err(e) => warn!(ref_id = %order.ref_id, error = %e, "Resume failed"),
            }
        }
        Ok(resumed)
    }
}
