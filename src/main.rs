use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use topup_backend::api;
use topup_backend::app::{operator_guards, Services};
use topup_backend::config::AppConfig;
use topup_backend::database::{init_pool_from_config, Stores};
use topup_backend::fulfillment::{DigiflazzProvider, FulfillmentProvider};
use topup_backend::health::HealthChecker;
use topup_backend::logging::init_tracing;
use topup_backend::payments::GatewayRegistry;
use topup_backend::workers::{
    ExpirySweepConfig, ExpirySweepWorker, PaidResumeConfig, PaidResumeWorker,
    PendingRecheckConfig, PendingRecheckWorker,
};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        testing = config.fulfillment.testing,
        "Starting topup backend"
    );

    let pool = init_pool_from_config(&config.database).await?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let stores = Stores::postgres(&pool);
    let gateways = GatewayRegistry::from_config(&config.qr_gateway, &config.va_gateway)?;
    let provider: Arc<dyn FulfillmentProvider> =
        Arc::new(DigiflazzProvider::new(config.fulfillment.clone())?);
    let guards = operator_guards(&config.admin, &stores);
    let services = Services::wire(
        &stores,
        gateways,
        provider,
        config.pricing.clone(),
        guards,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = vec![
        tokio::spawn(
            ExpirySweepWorker::new(
                stores.orders.clone(),
                stores.payments.clone(),
                services.lifecycle.clone(),
                services.reconciler.clone(),
                ExpirySweepConfig::from(&config.workers),
            )
            .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            PaidResumeWorker::new(
                stores.orders.clone(),
                services.orchestrator.clone(),
                PaidResumeConfig::from(&config.workers),
            )
            .run(shutdown_rx.clone()),
        ),
        tokio::spawn(
            PendingRecheckWorker::new(
                stores.orders.clone(),
                services.orchestrator.clone(),
                PendingRecheckConfig::from(&config.topup_policy),
            )
            .run(shutdown_rx),
        ),
    ];
    info!(count = workers.len(), "Background workers started");

    let app = api::router(services.app_state(), HealthChecker::new(pool.clone()));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            error!("Timed out waiting for worker shutdown");
        }
    }

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}
