//! Member balance ledger: every write is one balance change plus one entry

mod common;

use bigdecimal::BigDecimal;
use std::sync::Arc;

use common::TestApp;
use topup_backend::models::LedgerEntryType;
use topup_backend::services::LedgerError;

#[tokio::test]
async fn balance_always_equals_sum_of_entries() {
    let app = TestApp::new();
    let member = app.ledger.add_member(0);
    let ledger = app.services.ledger.clone();

    ledger
        .credit(member, &BigDecimal::from(50_000), "Topup saldo", "admin")
        .await
        .unwrap();
    ledger
        .debit(member, &BigDecimal::from(12_500), "Pembelian ML86", "INV-1")
        .await
        .unwrap();
    ledger
        .refund(member, &BigDecimal::from(12_500), "Refund INV-1", "INV-1")
        .await
        .unwrap();
    ledger
        .debit(member, &BigDecimal::from(7_000), "Pembelian FF100", "INV-2")
        .await
        .unwrap();

    let entries = ledger.entries(member).await.unwrap();
    let sum: BigDecimal = entries.iter().map(|e| e.amount.clone()).sum();
    assert_eq!(sum, ledger.balance(member).await.unwrap());
    assert_eq!(sum, BigDecimal::from(43_000));
    assert_eq!(entries[0].entry_type, LedgerEntryType::Credit);
    assert_eq!(entries[1].reference_id.as_deref(), Some("INV-1"));
}

#[tokio::test]
async fn overdraft_is_refused_without_writing() {
    let app = TestApp::new();
    let member = app.ledger.add_member(9_999);

    let err = app
        .services
        .ledger
        .debit(member, &BigDecimal::from(10_000), "Pembelian", "INV-3")
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientBalance {
            available,
            required,
        } => {
            assert_eq!(available, BigDecimal::from(9_999));
            assert_eq!(required, BigDecimal::from(10_000));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(app.ledger.entries_of(member).is_empty());
    assert_eq!(app.ledger.balance_of(member), BigDecimal::from(9_999));
}

#[tokio::test]
async fn concurrent_debits_never_overdraw() {
    let app = TestApp::new();
    let member = app.ledger.add_member(25_000);
    let ledger = app.services.ledger.clone();

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .debit(member, &BigDecimal::from(10_000), "Pembelian", &format!("INV-{i}"))
                    .await
            })
        })
        .collect();

    let mut ok = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 2);
    assert_eq!(app.ledger.balance_of(member), BigDecimal::from(5_000));
    assert_eq!(app.ledger.entries_of(member).len(), 2);
}

#[tokio::test]
async fn non_positive_amounts_and_unknown_members() {
    let app = TestApp::new();
    let member = app.ledger.add_member(1_000);
    let ledger = &app.services.ledger;

    let err = ledger
        .credit(member, &BigDecimal::from(0), "nothing", "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));

    let stranger = uuid::Uuid::new_v4();
    let err = ledger
        .credit(stranger, &BigDecimal::from(100), "topup", "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MemberNotFound(id) if id == stranger));
}

#[tokio::test]
async fn suspended_member_cannot_spend_but_can_be_credited() {
    let app = TestApp::new();
    let member = app.ledger.add_member(50_000);
    app.ledger.suspend(member);
    let ledger = &app.services.ledger;

    let err = ledger
        .debit(member, &BigDecimal::from(10_000), "Pembelian", "INV-9")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::MemberInactive(id) if id == member));
    assert_eq!(app.ledger.balance_of(member), BigDecimal::from(50_000));
    assert!(app.ledger.entries_of(member).is_empty());

    ledger
        .refund(member, &BigDecimal::from(1_000), "Refund INV-8", "INV-8")
        .await
        .unwrap();
    assert_eq!(app.ledger.balance_of(member), BigDecimal::from(51_000));
}
