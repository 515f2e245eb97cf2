//! Background jobs driven one cycle at a time

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

use common::{pending, success, TestApp, SKU};
use topup_backend::fulfillment::FulfillmentError;
use topup_backend::models::{OrderStatus, PaymentStatus, ProviderMeta};
use topup_backend::services::order_service::{CreateOrderRequest, MemberOrderRequest};
use topup_backend::workers::{
    ExpirySweepConfig, ExpirySweepWorker, PaidResumeConfig, PaidResumeWorker,
    PendingRecheckConfig, PendingRecheckWorker, SweepStats,
};

fn sweep(app: &TestApp) -> ExpirySweepWorker {
    ExpirySweepWorker::new(
        app.orders.clone(),
        app.payments.clone(),
        app.services.lifecycle.clone(),
        app.services.reconciler.clone(),
        ExpirySweepConfig {
            interval: Duration::from_millis(10),
            pending_order_max_age: Duration::from_secs(3600),
            batch_size: 10,
        },
    )
}

fn recheck(app: &TestApp, max_attempts: i32) -> PendingRecheckWorker {
    PendingRecheckWorker::new(
        app.orders.clone(),
        app.services.orchestrator.clone(),
        PendingRecheckConfig {
            interval: Duration::from_millis(10),
            max_attempts,
            batch_size: 10,
        },
    )
}

async fn pending_member_order(app: &TestApp) -> topup_backend::models::Order {
    let member = app.ledger.add_member(10_000);
    app.provider.push(Ok(pending()));
    app.services
        .orders
        .member_purchase(
            member,
            MemberOrderRequest {
                buyer_sku_code: SKU.to_string(),
                customer_no: "12345".to_string(),
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn sweep_expires_lapsed_payments_with_their_orders() {
    let app = TestApp::new();
    let lapsed = app.waiting_order().await;
    let fresh = app.waiting_order().await;
    let payment = app.payments.for_order(lapsed.id)[0].clone();
    app.payments
        .set_expiry(payment.id, Utc::now() - ChronoDuration::minutes(5));

    let stats = sweep(&app).run_cycle().await.unwrap();
    assert_eq!(stats.payments_expired, 1);
    assert_eq!(stats.orders_expired, 1);

    assert_eq!(app.orders.get(lapsed.id).unwrap().status, OrderStatus::Expired);
    assert_eq!(
        app.payments.for_order(lapsed.id)[0].status,
        PaymentStatus::Expired
    );
    assert_eq!(
        app.orders.get(fresh.id).unwrap().status,
        OrderStatus::WaitingPayment
    );

    // Nothing left to do on the next pass
    let again = sweep(&app).run_cycle().await.unwrap();
    assert_eq!(again, SweepStats::default());
}

#[tokio::test]
async fn sweep_never_expires_an_order_that_moved_on() {
    let app = TestApp::new();
    let order = app.waiting_order().await;
    let payment = app.payments.for_order(order.id)[0].clone();
    app.payments
        .set_expiry(payment.id, Utc::now() - ChronoDuration::minutes(5));

    // Payment confirmed after the instrument's deadline but before the sweep
    app.services
        .lifecycle
        .transition(order.id, OrderStatus::Paid, ProviderMeta::default())
        .await
        .unwrap();

    let stats = sweep(&app).run_cycle().await.unwrap();
    assert_eq!(stats.orders_expired, 0);
    assert_eq!(app.orders.get(order.id).unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
async fn sweep_cancels_abandoned_pending_orders() {
    let app = TestApp::new();
    let request = || CreateOrderRequest {
        buyer_sku_code: SKU.to_string(),
        customer_no: "12345678".to_string(),
        customer_name: None,
        customer_email: None,
        customer_phone: None,
    };
    let stale = app.services.orders.create_order(request()).await.unwrap();
    let recent = app.services.orders.create_order(request()).await.unwrap();
    app.orders.backdate(stale.id, ChronoDuration::hours(2));

    let stats = sweep(&app).run_cycle().await.unwrap();
    assert_eq!(stats.orders_cancelled, 1);
    assert_eq!(app.orders.get(stale.id).unwrap().status, OrderStatus::Cancelled);
    assert_eq!(app.orders.get(recent.id).unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn paid_resume_dispatches_stuck_orders_once() {
    let app = TestApp::new();
    let order = app.waiting_order().await;
    app.services
        .lifecycle
        .transition(order.id, OrderStatus::Paid, ProviderMeta::default())
        .await
        .unwrap();
    app.orders.backdate(order.id, ChronoDuration::minutes(10));
    app.provider.push(Ok(success("SN-RESUME")));

    let worker = PaidResumeWorker::new(
        app.orders.clone(),
        app.services.orchestrator.clone(),
        PaidResumeConfig {
            interval: Duration::from_millis(10),
            stuck_after: Duration::from_secs(120),
            batch_size: 10,
        },
    );
    assert_eq!(worker.run_cycle().await.unwrap(), 1);
    assert_eq!(worker.run_cycle().await.unwrap(), 0);

    let done = app.orders.get(order.id).unwrap();
    assert_eq!(done.status, OrderStatus::Success);
    assert_eq!(app.provider.call_count(), 1);
}

#[tokio::test]
async fn recheck_resolves_pending_order() {
    let app = TestApp::new();
    let order = pending_member_order(&app).await;
    assert_eq!(order.status, OrderStatus::Processing);

    app.provider.push(Ok(success("SN-LATE")));
    let resolved = recheck(&app, 5).run_cycle().await.unwrap();
    assert_eq!(resolved, 1);

    let done = app.orders.get(order.id).unwrap();
    assert_eq!(done.status, OrderStatus::Success);
    assert_eq!(done.recheck_attempts, 1);

    let calls = app.provider.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].ref_id, calls[1].ref_id);
}

#[tokio::test]
async fn recheck_stops_after_max_attempts() {
    let app = TestApp::new();
    let order = pending_member_order(&app).await;
    let worker = recheck(&app, 2);

    assert_eq!(worker.run_cycle().await.unwrap(), 0);
    assert_eq!(worker.run_cycle().await.unwrap(), 0);
    assert_eq!(worker.run_cycle().await.unwrap(), 0);

    let order = app.orders.get(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.recheck_attempts, 2);
    assert_eq!(app.provider.call_count(), 3);
}

#[tokio::test]
async fn recheck_transport_error_keeps_order_in_flight() {
    let app = TestApp::new();
    let order = pending_member_order(&app).await;
    app.provider.push(Err(FulfillmentError::Transport {
        message: "timeout".to_string(),
    }));

    assert_eq!(recheck(&app, 5).run_cycle().await.unwrap(), 0);
    let order = app.orders.get(order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    assert!(app.ledger.entries_of(order.member_id.unwrap()).len() == 1);
}

#[tokio::test]
async fn workers_stop_on_shutdown_signal() {
    let app = TestApp::new();
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handles = vec![
        tokio::spawn(sweep(&app).run(rx.clone())),
        tokio::spawn(recheck(&app, 3).run(rx.clone())),
        tokio::spawn(
            PaidResumeWorker::new(
                app.orders.clone(),
                app.services.orchestrator.clone(),
                PaidResumeConfig::default(),
            )
            .run(rx),
        ),
    ];

    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
