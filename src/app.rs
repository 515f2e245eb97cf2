//! Composition root: builds every service from the stores and adapters

use std::sync::Arc;
use tracing::warn;

use crate::api::AppState;
use crate::config::{AdminSecurityConfig, PricingConfig};
use crate::database::Stores;
use crate::fulfillment::FulfillmentProvider;
use crate::payments::GatewayRegistry;
use crate::services::operator::DenyAllChallenge;
use crate::services::{
    AdminService, AuditRateLimiter, LedgerService, OperatorChallenge, OperatorGuards,
    OrderLifecycle, OrderService, PaymentReconciler, TopupOrchestrator, TotpChallenge,
    WebhookProcessor,
};

#[derive(Clone)]
pub struct Services {
    pub lifecycle: Arc<OrderLifecycle>,
    pub ledger: Arc<LedgerService>,
    pub orchestrator: Arc<TopupOrchestrator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub webhooks: Arc<WebhookProcessor>,
    pub orders: Arc<OrderService>,
    pub admin: Arc<AdminService>,
}

impl Services {
    pub fn wire(
        stores: &Stores,
        gateways: GatewayRegistry,
        provider: Arc<dyn FulfillmentProvider>,
        pricing: PricingConfig,
        guards: OperatorGuards,
    ) -> Self {
        let lifecycle = Arc::new(OrderLifecycle::new(stores.orders.clone()));
        let ledger = Arc::new(LedgerService::new(stores.ledger.clone()));
        let orchestrator = Arc::new(TopupOrchestrator::new(
            lifecycle.clone(),
            ledger.clone(),
            provider,
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            lifecycle.clone(),
            stores.payments.clone(),
            gateways,
            orchestrator.clone(),
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            stores.receipts.clone(),
            lifecycle.clone(),
            reconciler.clone(),
            orchestrator.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            lifecycle.clone(),
            reconciler.clone(),
            orchestrator.clone(),
            ledger.clone(),
            stores.catalog.clone(),
            stores.payments.clone(),
            pricing,
        ));
        let admin = Arc::new(AdminService::new(
            lifecycle.clone(),
            reconciler.clone(),
            orchestrator.clone(),
            ledger.clone(),
            stores,
            guards,
        ));

        Self {
            lifecycle,
            ledger,
            orchestrator,
            reconciler,
            webhooks,
            orders,
            admin,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            orders: self.orders.clone(),
            webhooks: self.webhooks.clone(),
            admin: self.admin.clone(),
        }
    }
}

/// TOTP challenge and audit-backed ceiling from the admin settings
pub fn operator_guards(config: &AdminSecurityConfig, stores: &Stores) -> OperatorGuards {
    let challenge: Arc<dyn OperatorChallenge> = match TotpChallenge::from_base32(&config.totp_secret) {
        Some(totp) => Arc::new(totp),
        None => {
            warn!("ADMIN_TOTP_SECRET missing or invalid, operator topups are disabled");
            Arc::new(DenyAllChallenge)
        }
    };

    OperatorGuards {
        challenge,
        limiter: Arc::new(AuditRateLimiter::new(
            stores.audit.clone(),
            config.max_topups_per_hour,
        )),
        password: config.password.clone(),
        max_topups_per_hour: config.max_topups_per_hour,
    }
}
