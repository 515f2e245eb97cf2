use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::TopupPolicyConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::OrderStore;
use crate::models::OrderStatus;
use crate::services::topup_orchestrator::TopupOrchestrator;

#[derive(Debug, Clone)]
pub struct PendingRecheckConfig {
    pub interval: Duration,
    pub max_attempts: i32,
    pub batch_size: i64,
}

impl Default for PendingRecheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_attempts: 10,
            batch_size: 50,
        }
    }
}

impl From<&TopupPolicyConfig> for PendingRecheckConfig {
    fn from(policy: &TopupPolicyConfig) -> Self {
        Self {
            interval: Duration::from_secs(policy.recheck_interval_secs),
            max_attempts: policy.recheck_max_attempts,
            ..Self::default()
        }
    }
}

/// Re-asks the provider about orders it answered `Pending`, resending the
/// same provider ref id, up to a bounded number of attempts.
pub struct PendingRecheckWorker {
    orders: Arc<dyn OrderStore>,
    orchestrator: Arc<TopupOrchestrator>,
    config: PendingRecheckConfig,
}

impl PendingRecheckWorker {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        orchestrator: Arc<TopupOrchestrator>,
        config: PendingRecheckConfig,
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
            max_attempts = self.config.max_attempts,
            "pending recheck worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("pending recheck worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    match self.run_cycle().await {
                        Ok(0) => {}
                        Ok(resolved) => info!(resolved, "pending topups resolved"),
                        Err(e) => warn!(error = %e, "pending recheck cycle failed"),
                    }
                }
            }
        }

        info!("pending recheck worker stopped");
    }

    /// Number of orders that left `processing` this cycle
    pub async fn run_cycle(&self) -> Result<usize, DatabaseError> {
        let pending = self
            .orders
            .list_pending_rechecks(self.config.max_attempts, self.config.batch_size)
            .await?;

        let mut resolved = 0;
        for order in pending {
            self.orders.increment_recheck_attempts(order.id).await?;
            let attempt = order.recheck_attempts + 1;

            match self.orchestrator.recheck(order.clone()).await {
                Ok(updated) if updated.status != OrderStatus::Processing => resolved += 1,
                Ok(_) if attempt >= self.config.max_attempts => {
                    warn!(
                        ref_id = %order.ref_id,
                        attempts = attempt,
                        "Provider still pending after final re-check, left for operators"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(ref_id = %order.ref_id, attempt, error = %e, "Re-check failed"),
            }
        }
        Ok(resolved)
    }
}
