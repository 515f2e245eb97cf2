//! In-memory stores and stub adapters shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use topup_backend::app::Services;
use topup_backend::config::{FulfillmentConfig, PricingConfig, QrGatewayConfig};
use topup_backend::database::error::{DatabaseError, DatabaseErrorKind};
use topup_backend::database::repository::{
    AuditStore, CatalogStore, LedgerStore, OrderStore, PaymentStore, ReceiptStore,
};
use topup_backend::database::Stores;
use topup_backend::fulfillment::digiflazz::callback_signature;
use topup_backend::fulfillment::{
    DigiflazzProvider, FulfillmentError, FulfillmentOutcome, FulfillmentProvider,
    FulfillmentResult, ProviderBalance, ProviderCallback, ProviderResult, TopupRequest,
};
use topup_backend::models::{
    AuditEntry, LedgerEntry, LedgerEntryType, LedgerMutation, LedgerWrite, Member, MemberStatus,
    NewAuditEntry, NewOrder, NewPayment, Order, OrderSource, OrderStatus, Payment, PaymentMethod,
    PaymentStatus, Product, ProviderMeta, WebhookReceipt,
};
use topup_backend::payments::providers::qrispw::QrispwGateway;
use topup_backend::payments::utils::hmac_sha256_hex;
use topup_backend::payments::{
    CreatePaymentRequest, GatewayName, GatewayPaymentStatus, GatewayRegistry, GatewayWebhookEvent,
    PaymentGateway, PaymentInstrument, PaymentQuery, PaymentResult, WebhookVerificationResult,
};
use topup_backend::services::operator::{AuditRateLimiter, OperatorChallenge};
use topup_backend::services::OperatorGuards;

pub const QR_WEBHOOK_SECRET: &str = "qr-webhook-secret";
pub const PROVIDER_WEBHOOK_SECRET: &str = "provider-webhook-secret";
pub const ADMIN_PASSWORD: &str = "s3cret-admin";
pub const TOTP_CODE: &str = "424242";
pub const SKU: &str = "ML86";

fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
        constraint: constraint.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
    /// Every insert collides with an existing ref_id
    pub reject_inserts: AtomicBool,
}

impl MemOrderStore {
    pub fn get(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Order> {
        self.orders.lock().unwrap().values().cloned().collect()
    }

    /// Pretends the row was last touched `age` ago
    pub fn backdate(&self, id: Uuid, age: Duration) {
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id) {
            order.updated_at = Utc::now() - age;
        }
    }
}

#[async_trait]
impl OrderStore for MemOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if self.reject_inserts.load(Ordering::SeqCst)
            || orders.values().any(|o| o.ref_id == order.ref_id)
        {
            return Err(unique_violation("orders_ref_id_key"));
        }

        let now = Utc::now();
        let created = Order {
            id: Uuid::new_v4(),
            provider_ref_id: order.ref_id.clone(),
            ref_id: order.ref_id,
            buyer_sku_code: order.buyer_sku_code,
            product_name: order.product_name,
            customer_no: order.customer_no,
            buy_price: order.buy_price,
            selling_price: order.selling_price,
            status: OrderStatus::Pending,
            provider_status: None,
            provider_rc: None,
            serial_number: None,
            provider_message: None,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            order_source: order.order_source,
            admin_notes: order.admin_notes,
            member_id: order.member_id,
            member_price: order.member_price,
            recheck_attempts: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.get(id))
    }

    async fn find_by_ref_id(&self, ref_id: &str) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.ref_id == ref_id)
            .cloned())
    }

    async fn find_by_provider_ref_id(
        &self,
        provider_ref_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.provider_ref_id == provider_ref_id)
            .cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        meta: &ProviderMeta,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        let Some(order) = orders.get_mut(&id).filter(|o| o.status == expected) else {
            return Ok(None);
        };

        order.status = next;
        if meta.status.is_some() {
            order.provider_status = meta.status.clone();
        }
        if meta.rc.is_some() {
            order.provider_rc = meta.rc.clone();
        }
        if meta.serial.is_some() {
            order.serial_number = meta.serial.clone();
        }
        if meta.message.is_some() {
            order.provider_message = meta.message.clone();
        }
        if completed_at.is_some() {
            order.completed_at = completed_at;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn reopen_for_retry(
        &self,
        id: Uuid,
        provider_ref_id: &str,
        customer_no: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut orders = self.orders.lock().unwrap();
        if orders
            .values()
            .any(|o| o.id != id && o.provider_ref_id == provider_ref_id)
        {
            return Err(unique_violation("orders_provider_ref_id_key"));
        }
        let Some(order) = orders
            .get_mut(&id)
            .filter(|o| o.status == OrderStatus::Failed)
        else {
            return Ok(None);
        };

        order.status = OrderStatus::Processing;
        order.provider_ref_id = provider_ref_id.to_string();
        order.customer_no = customer_no.to_string();
        order.provider_status = None;
        order.provider_rc = None;
        order.serial_number = None;
        order.provider_message = None;
        order.completed_at = None;
        order.recheck_attempts = 0;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn list_by_status_before(
        &self,
        status: OrderStatus,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        let mut rows: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.status == status && o.updated_at < updated_before)
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.updated_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn list_pending_rechecks(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        let mut rows: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| {
                o.status == OrderStatus::Processing
                    && o.provider_status.as_deref() == Some("Pending")
                    && o.recheck_attempts < max_attempts
            })
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.updated_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn increment_recheck_attempts(&self, id: Uuid) -> Result<(), DatabaseError> {
        if let Some(order) = self.orders.lock().unwrap().get_mut(&id) {
            order.recheck_attempts += 1;
            order.updated_at = Utc::now();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemPaymentStore {
    payments: Mutex<Vec<Payment>>,
}

impl MemPaymentStore {
    pub fn for_order(&self, order_id: Uuid) -> Vec<Payment> {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn set_expiry(&self, id: Uuid, expired_at: DateTime<Utc>) {
        if let Some(p) = self.payments.lock().unwrap().iter_mut().find(|p| p.id == id) {
            p.expired_at = expired_at;
        }
    }
}

#[async_trait]
impl PaymentStore for MemPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let created = Payment {
            id: Uuid::new_v4(),
            order_id: payment.order_id,
            amount: payment.amount,
            fee: payment.fee,
            total_payment: payment.total_payment,
            payment_method: payment.payment_method,
            payment_number: payment.payment_number,
            gateway_reference: payment.gateway_reference,
            qr_image_url: payment.qr_image_url,
            status: PaymentStatus::Pending,
            expired_at: payment.expired_at,
            completed_at: None,
            created_at: Utc::now(),
        };
        self.payments.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find_latest_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut payments = self.payments.lock().unwrap();
        let Some(payment) = payments
            .iter_mut()
            .find(|p| p.id == id && p.status == expected)
        else {
            return Ok(None);
        };
        payment.status = next;
        if completed_at.is_some() {
            payment.completed_at = completed_at;
        }
        Ok(Some(payment.clone()))
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let mut rows: Vec<Payment> = self
            .payments
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending && p.expired_at < now)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.expired_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Member ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemLedgerStore {
    members: Mutex<HashMap<Uuid, Member>>,
    entries: Mutex<Vec<LedgerEntry>>,
    /// Fails every write of this entry type
    failing: Mutex<Option<LedgerEntryType>>,
}

impl MemLedgerStore {
    pub fn add_member(&self, balance: i64) -> Uuid {
        let member = Member {
            id: Uuid::new_v4(),
            email: format!("{}@reseller.test", Uuid::new_v4()),
            name: "Reseller".to_string(),
            password_hash: "x".to_string(),
            balance: BigDecimal::from(balance),
            status: MemberStatus::Active,
            created_at: Utc::now(),
        };
        let id = member.id;
        self.members.lock().unwrap().insert(id, member);
        id
    }

    pub fn balance_of(&self, id: Uuid) -> BigDecimal {
        self.members
            .lock()
            .unwrap()
            .get(&id)
            .map(|m| m.balance.clone())
            .unwrap_or_default()
    }

    pub fn entries_of(&self, id: Uuid) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == id)
            .cloned()
            .collect()
    }

    pub fn suspend(&self, id: Uuid) {
        if let Some(member) = self.members.lock().unwrap().get_mut(&id) {
            member.status = MemberStatus::Suspended;
        }
    }

    pub fn fail_writes_of(&self, entry_type: Option<LedgerEntryType>) {
        *self.failing.lock().unwrap() = entry_type;
    }
}

#[async_trait]
impl LedgerStore for MemLedgerStore {
    async fn find_member(&self, id: Uuid) -> Result<Option<Member>, DatabaseError> {
        Ok(self.members.lock().unwrap().get(&id).cloned())
    }

    async fn apply(&self, mutation: LedgerMutation) -> Result<LedgerWrite, DatabaseError> {
        if *self.failing.lock().unwrap() == Some(mutation.entry_type) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionError {
                message: "ledger unavailable".to_string(),
            }));
        }

        let mut members = self.members.lock().unwrap();
        let Some(member) = members.get_mut(&mutation.user_id) else {
            return Ok(LedgerWrite::MemberNotFound);
        };
        if mutation.entry_type == LedgerEntryType::Debit && !member.status.is_active() {
            return Ok(LedgerWrite::MemberInactive);
        }

        let balance_after = &member.balance + mutation.signed_amount();
        if balance_after < BigDecimal::from(0) {
            return Ok(LedgerWrite::InsufficientBalance {
                balance: member.balance.clone(),
            });
        }
        member.balance = balance_after.clone();

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: mutation.user_id,
            amount: mutation.signed_amount(),
            entry_type: mutation.entry_type,
            description: mutation.description,
            reference_id: mutation.reference_id,
            status: "success".to_string(),
            created_by: mutation.actor,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(entry.clone());
        Ok(LedgerWrite::Applied {
            entry,
            balance_after,
        })
    }

    async fn entries_for(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, DatabaseError> {
        Ok(self.entries_of(user_id))
    }
}

// ---------------------------------------------------------------------------
// Webhook receipts, audit trail, catalog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemReceiptStore {
    receipts: Mutex<Vec<WebhookReceipt>>,
    pub unavailable: AtomicBool,
}

impl MemReceiptStore {
    pub fn all(&self) -> Vec<WebhookReceipt> {
        self.receipts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptStore for MemReceiptStore {
    async fn log(&self, source: &str, payload: JsonValue) -> Result<WebhookReceipt, DatabaseError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::PoolExhausted));
        }
        let receipt = WebhookReceipt {
            id: Uuid::new_v4(),
            source: source.to_string(),
            payload,
            processed: false,
            error_message: None,
            created_at: Utc::now(),
        };
        self.receipts.lock().unwrap().push(receipt.clone());
        Ok(receipt)
    }

    async fn mark_processed(&self, id: Uuid, error: Option<&str>) -> Result<(), DatabaseError> {
        if let Some(r) = self
            .receipts
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.id == id && !r.processed)
        {
            r.processed = true;
            r.error_message = error.map(str::to_string);
        }
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<WebhookReceipt>, DatabaseError> {
        Ok(self
            .receipts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemAuditStore {
    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemAuditStore {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, DatabaseError> {
        let recorded = AuditEntry {
            id: Uuid::new_v4(),
            action: entry.action,
            order_id: entry.order_id,
            details: entry.details,
            ip_address: entry.ip_address,
            success: entry.success,
            error_message: entry.error_message,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(recorded.clone());
        Ok(recorded)
    }

    async fn count_successful_since(
        &self,
        actions: &[&str],
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.success && e.created_at >= since && actions.contains(&e.action.as_str()))
            .count() as i64)
    }
}

#[derive(Default)]
pub struct MemCatalog {
    products: Mutex<HashMap<String, Product>>,
}

impl MemCatalog {
    pub fn put(&self, product: Product) {
        self.products
            .lock()
            .unwrap()
            .insert(product.buyer_sku_code.clone(), product);
    }
}

#[async_trait]
impl CatalogStore for MemCatalog {
    async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, DatabaseError> {
        Ok(self.products.lock().unwrap().get(sku).cloned())
    }
}

pub fn product(sku: &str, selling_price: i64) -> Product {
    Product {
        buyer_sku_code: sku.to_string(),
        name: format!("{} Diamonds", sku),
        buy_price: BigDecimal::from(selling_price - 500),
        selling_price: BigDecimal::from(selling_price),
        discount_price: None,
        member_price: Some(BigDecimal::from(selling_price)),
        is_available: true,
    }
}

// ---------------------------------------------------------------------------
// Gateway and provider stubs
// ---------------------------------------------------------------------------

/// Issues fake instruments; webhook parsing and signatures go through the
/// real QRIS adapter so tests post the gateway's actual payload format.
pub struct StubGateway {
    name: GatewayName,
    webhooks: QrispwGateway,
    pub created: Mutex<Vec<CreatePaymentRequest>>,
    pub cancelled: AtomicUsize,
    pub detail: Mutex<GatewayPaymentStatus>,
}

impl StubGateway {
    pub fn new(name: GatewayName) -> Self {
        let webhooks = QrispwGateway::new(QrGatewayConfig {
            base_url: "http://qris.invalid".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            webhook_secret: QR_WEBHOOK_SECRET.to_string(),
            callback_url: None,
            request_timeout: 1,
        })
        .unwrap();
        Self {
            name,
            webhooks,
            created: Mutex::new(Vec::new()),
            cancelled: AtomicUsize::new(0),
            detail: Mutex::new(GatewayPaymentStatus::Pending),
        }
    }

    pub fn set_detail(&self, status: GatewayPaymentStatus) {
        *self.detail.lock().unwrap() = status;
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn name(&self) -> GatewayName {
        self.name
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> PaymentResult<PaymentInstrument> {
        self.created.lock().unwrap().push(request.clone());
        Ok(PaymentInstrument {
            amount: request.amount.clone(),
            fee: BigDecimal::from(0),
            total_payment: request.amount.clone(),
            payment_number: format!("00020101021226{}", request.ref_id),
            gateway_reference: Some(format!("TRX-{}", request.ref_id)),
            qr_image_url: None,
            expired_at: Utc::now() + Duration::minutes(10),
        })
    }

    async fn cancel_payment(&self, _query: &PaymentQuery) -> PaymentResult<()> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_payment_detail(
        &self,
        _query: &PaymentQuery,
    ) -> PaymentResult<GatewayPaymentStatus> {
        Ok(*self.detail.lock().unwrap())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        self.webhooks.verify_webhook(payload, signature)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<GatewayWebhookEvent> {
        self.webhooks.parse_webhook_event(payload)
    }
}

/// Scripted provider; callbacks are parsed by the real adapter
pub struct StubProvider {
    script: Mutex<VecDeque<Result<ProviderResult, FulfillmentError>>>,
    pub calls: Mutex<Vec<TopupRequest>>,
    callbacks: DigiflazzProvider,
}

impl StubProvider {
    pub fn new() -> Self {
        let callbacks = DigiflazzProvider::new(FulfillmentConfig {
            base_url: "http://provider.invalid".to_string(),
            username: "user".to_string(),
            api_key: "prod-key".to_string(),
            dev_key: "dev-key".to_string(),
            testing: true,
            callback_url: None,
            webhook_secret: PROVIDER_WEBHOOK_SECRET.to_string(),
            request_timeout: 1,
        })
        .unwrap();
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            callbacks,
        }
    }

    pub fn push(&self, result: Result<ProviderResult, FulfillmentError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FulfillmentProvider for StubProvider {
    async fn topup(&self, request: &TopupRequest) -> FulfillmentResult<ProviderResult> {
        self.calls.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(pending()))
    }

    async fn check_balance(&self) -> FulfillmentResult<ProviderBalance> {
        Ok(ProviderBalance {
            deposit: BigDecimal::from(1_000_000),
            cached: false,
            stale: false,
        })
    }

    fn verify_callback(&self, payload: &[u8], signature: Option<&str>) -> bool {
        self.callbacks.verify_callback(payload, signature)
    }

    fn parse_callback(&self, payload: &[u8]) -> FulfillmentResult<ProviderCallback> {
        self.callbacks.parse_callback(payload)
    }
}

pub fn success(serial: &str) -> ProviderResult {
    ProviderResult {
        outcome: FulfillmentOutcome::Success {
            serial: Some(serial.to_string()),
        },
        raw_status: "Sukses".to_string(),
        rc: Some("00".to_string()),
        message: Some("Transaksi Sukses".to_string()),
        price: None,
    }
}

pub fn pending() -> ProviderResult {
    ProviderResult {
        outcome: FulfillmentOutcome::Pending,
        raw_status: "Pending".to_string(),
        rc: Some("03".to_string()),
        message: Some("Transaksi Pending".to_string()),
        price: None,
    }
}

pub fn failed() -> ProviderResult {
    ProviderResult {
        outcome: FulfillmentOutcome::Failed,
        raw_status: "Gagal".to_string(),
        rc: Some("40".to_string()),
        message: Some("Nomor tujuan salah".to_string()),
        price: None,
    }
}

pub struct FixedChallenge;

impl OperatorChallenge for FixedChallenge {
    fn verify(&self, code: &str) -> bool {
        code == TOTP_CODE
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub orders: Arc<MemOrderStore>,
    pub payments: Arc<MemPaymentStore>,
    pub ledger: Arc<MemLedgerStore>,
    pub receipts: Arc<MemReceiptStore>,
    pub audit: Arc<MemAuditStore>,
    pub catalog: Arc<MemCatalog>,
    pub gateway: Arc<StubGateway>,
    pub provider: Arc<StubProvider>,
    pub stores: Stores,
    pub services: Services,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_topup_ceiling(10)
    }

    pub fn with_topup_ceiling(max_topups_per_hour: i64) -> Self {
        let orders = Arc::new(MemOrderStore::default());
        let payments = Arc::new(MemPaymentStore::default());
        let ledger = Arc::new(MemLedgerStore::default());
        let receipts = Arc::new(MemReceiptStore::default());
        let audit = Arc::new(MemAuditStore::default());
        let catalog = Arc::new(MemCatalog::default());
        catalog.put(product(SKU, 10_000));

        let stores = Stores {
            orders: orders.clone(),
            payments: payments.clone(),
            ledger: ledger.clone(),
            receipts: receipts.clone(),
            audit: audit.clone(),
            catalog: catalog.clone(),
        };

        let gateway = Arc::new(StubGateway::new(GatewayName::Qrispw));
        let registry = GatewayRegistry::new(gateway.clone(), gateway.clone());
        let provider = Arc::new(StubProvider::new());

        let guards = OperatorGuards {
            challenge: Arc::new(FixedChallenge),
            limiter: Arc::new(AuditRateLimiter::new(audit.clone(), max_topups_per_hour)),
            password: ADMIN_PASSWORD.to_string(),
            max_topups_per_hour,
        };
        let services = Services::wire(
            &stores,
            registry,
            provider.clone(),
            PricingConfig {
                web_admin_fee: BigDecimal::from(0),
            },
            guards,
        );

        Self {
            orders,
            payments,
            ledger,
            receipts,
            audit,
            catalog,
            gateway,
            provider,
            stores,
            services,
        }
    }

    /// Web order that has been issued a QRIS instrument
    pub async fn waiting_order(&self) -> Order {
        let order = self
            .services
            .orders
            .create_order(topup_backend::services::order_service::CreateOrderRequest {
                buyer_sku_code: SKU.to_string(),
                customer_no: "12345678".to_string(),
                customer_name: Some("Budi".to_string()),
                customer_email: None,
                customer_phone: None,
            })
            .await
            .unwrap();
        let view = self
            .services
            .orders
            .pay(
                order.id,
                topup_backend::services::order_service::PayOrderRequest {
                    payment_method: PaymentMethod::Qris,
                },
            )
            .await
            .unwrap();
        assert_eq!(view.order.status, OrderStatus::WaitingPayment);
        view.order
    }

    /// Prepaid order already handed to the provider and failed
    pub async fn failed_admin_order(&self) -> Order {
        let order = self
            .services
            .orchestrator
            .open_prepaid_order(NewOrder {
                ref_id: format!("ADMIN-{}", Uuid::new_v4()),
                buyer_sku_code: SKU.to_string(),
                product_name: "ML86 Diamonds".to_string(),
                customer_no: "12345678".to_string(),
                buy_price: BigDecimal::from(9_500),
                selling_price: BigDecimal::from(10_000),
                customer_name: None,
                customer_email: None,
                customer_phone: None,
                order_source: OrderSource::AdminCash,
                admin_notes: None,
                member_id: None,
                member_price: None,
            })
            .await
            .unwrap();
        self.provider.push(Ok(failed()));
        let order = self.services.orchestrator.dispatch(order).await.unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        order
    }

    /// Polls the store until the order reaches `status` or a second passes
    pub async fn wait_for_status(&self, order_id: Uuid, status: OrderStatus) -> Order {
        self.wait_for(order_id, |o| o.status == status).await
    }

    /// Background fulfillment has recorded a provider answer
    pub async fn wait_for_provider_answer(&self, order_id: Uuid) -> Order {
        self.wait_for(order_id, |o| o.provider_status.is_some()).await
    }

    pub async fn wait_for(&self, order_id: Uuid, done: impl Fn(&Order) -> bool) -> Order {
        for _ in 0..100 {
            if let Some(order) = self.orders.get(order_id) {
                if done(&order) {
                    return order;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "order {} never reached the expected state, last seen {:?}",
            order_id,
            self.orders.get(order_id).map(|o| o.status)
        );
    }
}

/// QRIS webhook body and its signature header
pub fn qris_webhook(ref_id: &str, amount: &str, status: &str) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "transaction_id": format!("TRX-{}", ref_id),
        "order_id": ref_id,
        "amount": amount,
        "status": status,
        "paid_at": "2024-06-01 10:00:00",
        "timestamp": 1717210800,
    })
    .to_string()
    .into_bytes();
    let signature = hmac_sha256_hex(&body, QR_WEBHOOK_SECRET).unwrap();
    (body, signature)
}

/// Provider push in the `{data: {...}}` envelope and its `X-Hub-Signature`
pub fn provider_callback(ref_id: &str, status: &str, serial: &str) -> (Vec<u8>, String) {
    let body = serde_json::json!({
        "data": {
            "trx_id": "T-1",
            "ref_id": ref_id,
            "customer_no": "12345678",
            "buyer_sku_code": SKU,
            "message": format!("Transaksi {}", status),
            "status": status,
            "rc": if status == "Sukses" { "00" } else { "40" },
            "sn": serial,
            "price": 9500,
        }
    })
    .to_string()
    .into_bytes();
    let signature = callback_signature(&body, PROVIDER_WEBHOOK_SECRET).unwrap();
    (body, signature)
}
