//! Operator remediation: manual retry, custom topups, status checks and the
//! hourly ceiling, all with their audit trail.

mod common;

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};

use common::{
    failed, pending, qris_webhook, success, TestApp, ADMIN_PASSWORD, SKU, TOTP_CODE,
};
use topup_backend::models::{LedgerEntryType, OrderSource, OrderStatus, PaymentStatus};
use topup_backend::services::admin_service::{
    CustomTopupRequest, CustomTopupSource, ManualTopupRequest,
};
use topup_backend::services::order_service::MemberOrderRequest;
use topup_backend::services::topup_orchestrator::TopupError;
use topup_backend::services::AdminError;

fn retry_request(code: &str) -> ManualTopupRequest {
    ManualTopupRequest {
        totp_code: code.to_string(),
        customer_no: None,
    }
}

fn custom_request(password: &str) -> CustomTopupRequest {
    CustomTopupRequest {
        sku: SKU.to_string(),
        customer_no: "555000111".to_string(),
        source: CustomTopupSource::Gift,
        notes: Some("giveaway winner".to_string()),
        password: password.to_string(),
        totp_code: TOTP_CODE.to_string(),
    }
}

#[tokio::test]
async fn manual_retry_uses_fresh_provider_ref() {
    let app = TestApp::new();
    let order = app.failed_admin_order().await;
    app.provider.push(Ok(success("SN-RETRY")));

    let retried = app
        .services
        .admin
        .manual_topup(
            order.id,
            ManualTopupRequest {
                totp_code: TOTP_CODE.to_string(),
                customer_no: Some(" 99998888 ".to_string()),
            },
            Some("10.0.0.1".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(retried.status, OrderStatus::Success);
    assert_eq!(retried.ref_id, order.ref_id);
    assert!(retried.provider_ref_id.starts_with("RETRY-"));
    assert_eq!(retried.customer_no, "99998888");

    let calls = app.provider.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].ref_id, order.ref_id);
    assert_eq!(calls[1].ref_id, retried.provider_ref_id);

    let audit = app.audit.all();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
    assert_eq!(audit[0].order_id, Some(order.id));
    assert_eq!(audit[0].ip_address.as_deref(), Some("10.0.0.1"));
}

#[tokio::test]
async fn retried_order_resolves_by_new_provider_ref() {
    let app = TestApp::new();
    let order = app.failed_admin_order().await;
    app.provider.push(Ok(pending()));

    let retried = app
        .services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap();
    assert_eq!(retried.status, OrderStatus::Processing);

    // The old id no longer resolves to an in-flight order
    let (stale, stale_sig) = common::provider_callback(&order.ref_id, "Sukses", "SN-OLD");
    let outcome = app
        .services
        .webhooks
        .process_provider_callback(&stale, Some(&stale_sig))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        topup_backend::services::WebhookOutcome::Ignored { .. }
    ));

    let (fresh, fresh_sig) =
        common::provider_callback(&retried.provider_ref_id, "Sukses", "SN-NEW");
    app.services
        .webhooks
        .process_provider_callback(&fresh, Some(&fresh_sig))
        .await
        .unwrap();
    let done = app.orders.get(order.id).unwrap();
    assert_eq!(done.status, OrderStatus::Success);
    assert_eq!(done.serial_number.as_deref(), Some("SN-NEW"));
}

#[tokio::test]
async fn manual_retry_rejects_bad_code_and_audits_it() {
    let app = TestApp::new();
    let order = app.failed_admin_order().await;

    let err = app
        .services
        .admin
        .manual_topup(order.id, retry_request("000000"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Unauthorized(_)));
    assert_eq!(app.orders.get(order.id).unwrap().status, OrderStatus::Failed);

    let audit = app.audit.all();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert!(audit[0].error_message.is_some());
}

#[tokio::test]
async fn manual_retry_only_for_failed_orders() {
    let app = TestApp::new();
    let order = app.waiting_order().await;

    let err = app
        .services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Validation { .. }));
}

#[tokio::test]
async fn manual_retry_of_paid_web_order() {
    let app = TestApp::new();
    app.provider.push(Ok(failed()));
    let order = app.waiting_order().await;

    let (body, sig) = qris_webhook(&order.ref_id, "10000", "paid");
    app.services
        .webhooks
        .process_gateway_webhook("qrispw", &body, Some(&sig))
        .await
        .unwrap();
    app.wait_for_status(order.id, OrderStatus::Failed).await;
    assert_eq!(
        app.payments.for_order(order.id)[0].status,
        PaymentStatus::Completed
    );

    app.provider.push(Ok(success("SN-WEB-RETRY")));
    let retried = app
        .services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap();
    assert_eq!(retried.status, OrderStatus::Success);
}

#[tokio::test]
async fn member_orders_are_not_retried() {
    let app = TestApp::new();
    let member = app.ledger.add_member(20_000);
    app.provider.push(Ok(failed()));
    let order = app
        .services
        .orders
        .member_purchase(
            member,
            MemberOrderRequest {
                buyer_sku_code: SKU.to_string(),
                customer_no: "1234".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Failed);

    let err = app
        .services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdminError::Topup(TopupError::Validation { .. })
    ));
    assert_eq!(app.ledger.balance_of(member), BigDecimal::from(20_000));
}

#[tokio::test]
async fn custom_topup_creates_operator_order() {
    let app = TestApp::new();
    app.provider.push(Ok(success("SN-GIFT")));

    let order = app
        .services
        .admin
        .custom_topup(custom_request(ADMIN_PASSWORD), None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Success);
    assert_eq!(order.order_source, OrderSource::AdminGift);
    assert!(order.ref_id.starts_with("ADMIN-"));
    assert_eq!(order.admin_notes.as_deref(), Some("giveaway winner"));
    assert!(app.payments.for_order(order.id).is_empty());

    let audit = app.audit.all();
    assert_eq!(audit[0].action, "custom_topup");
    assert_eq!(audit[0].order_id, Some(order.id));
}

#[tokio::test]
async fn custom_topup_requires_password() {
    let app = TestApp::new();

    let err = app
        .services
        .admin
        .custom_topup(custom_request("wrong"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Unauthorized(_)));
    assert!(app.orders.all().is_empty());
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn hourly_ceiling_spans_both_topup_kinds() {
    let app = TestApp::with_topup_ceiling(2);

    app.services
        .admin
        .custom_topup(custom_request(ADMIN_PASSWORD), None)
        .await
        .unwrap();

    let order = app.failed_admin_order().await;
    app.services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap();

    let err = app
        .services
        .admin
        .custom_topup(custom_request(ADMIN_PASSWORD), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::RateLimited { limit: 2 }));

    // Rejected attempts do not count against the ceiling
    let successes = app.audit.all().iter().filter(|e| e.success).count();
    assert_eq!(successes, 2);
}

#[tokio::test]
async fn failed_dispatch_does_not_use_up_the_ceiling() {
    let app = TestApp::with_topup_ceiling(1);

    let order = app.failed_admin_order().await;
    app.provider.push(Ok(failed()));
    let retried = app
        .services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap();
    assert_eq!(retried.status, OrderStatus::Failed);

    let audit = app.audit.all();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert!(audit[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains(&order.ref_id)));

    app.provider.push(Ok(success("SN-SECOND")));
    let retried = app
        .services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap();
    assert_eq!(retried.status, OrderStatus::Success);

    let err = app
        .services
        .admin
        .custom_topup(custom_request(ADMIN_PASSWORD), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::RateLimited { limit: 1 }));
}

#[tokio::test]
async fn check_status_rechecks_processing_order() {
    let app = TestApp::new();
    let order = app.failed_admin_order().await;
    app.services
        .admin
        .manual_topup(order.id, retry_request(TOTP_CODE), None)
        .await
        .unwrap();
    assert_eq!(
        app.orders.get(order.id).unwrap().status,
        OrderStatus::Processing
    );

    app.provider.push(Ok(success("SN-CHECK")));
    let checked = app.services.admin.check_status(order.id).await.unwrap();
    assert_eq!(checked.status, OrderStatus::Success);
    assert_eq!(checked.serial_number.as_deref(), Some("SN-CHECK"));
}

#[tokio::test]
async fn check_status_expires_lapsed_payment() {
    let app = TestApp::new();
    let order = app.waiting_order().await;
    let payment = app.payments.for_order(order.id)[0].clone();
    app.payments
        .set_expiry(payment.id, Utc::now() - Duration::minutes(1));

    let checked = app.services.admin.check_status(order.id).await.unwrap();
    assert_eq!(checked.status, OrderStatus::Expired);
    assert_eq!(
        app.payments.for_order(order.id)[0].status,
        PaymentStatus::Expired
    );
}

#[tokio::test]
async fn member_topup_credits_and_audits() {
    let app = TestApp::new();
    let member = app.ledger.add_member(0);

    let receipt = app
        .services
        .admin
        .topup_member(member, BigDecimal::from(75_000), None)
        .await
        .unwrap();
    assert_eq!(receipt.balance_after, BigDecimal::from(75_000));
    assert_eq!(receipt.entry.entry_type, LedgerEntryType::Credit);
    assert_eq!(receipt.entry.created_by, "admin");

    let err = app
        .services
        .admin
        .topup_member(member, BigDecimal::from(-5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AdminError::Ledger(_)));

    let audit = app.audit.all();
    assert_eq!(audit.len(), 2);
    assert!(audit[0].success);
    assert!(!audit[1].success);
}

#[tokio::test]
async fn recent_webhooks_and_provider_balance() {
    let app = TestApp::new();
    let order = app.waiting_order().await;
    for _ in 0..3 {
        let (body, sig) = qris_webhook(&order.ref_id, "10000", "pending");
        app.services
            .webhooks
            .process_gateway_webhook("qrispw", &body, Some(&sig))
            .await
            .unwrap();
    }

    let page = app.services.admin.recent_webhooks(2).await.unwrap();
    assert_eq!(page.len(), 2);
    let all = app.services.admin.recent_webhooks(0).await.unwrap();
    assert_eq!(all.len(), 1);

    let balance = app.services.admin.provider_balance().await.unwrap();
    assert_eq!(balance.deposit, BigDecimal::from(1_000_000));
}
