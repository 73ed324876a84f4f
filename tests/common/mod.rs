#![allow(dead_code)]

pub mod pg;

use {
    market_core::{
        AppState,
        config::{Settings, StorageConfig},
        domain::{
            deliverable::Deliverable,
            error::MarketError,
            id::{DeliverableId, IntentRef, ListingId, OrderId, UserId},
            integrity::IntegrityReport,
            listing::{Listing, ListingStatus},
            money::Currency,
            order::Order,
            payment_event::ReconcileOutcome,
            ports::AlertSink,
            principal::{Principal, RequestContext},
            provider::{BoxFuture, CreatedIntent, IntentRequest, PaymentGateway},
            store::OrderRepo,
        },
        infra::{
            memory::{MemoryAuth, MemoryStore},
            rate_limit::FixedWindowLimiter,
            storage::HmacUrlSigner,
        },
        services::{
            checkout::{CheckoutSession, start_checkout},
            reconciler::handle_event,
        },
    },
    async_trait::async_trait,
    chrono::Utc,
    hmac::{Hmac, Mac},
    parking_lot::Mutex,
    rust_decimal::Decimal,
    serde_json::json,
    sha2::Sha256,
    std::{
        collections::HashMap,
        str::FromStr,
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicU32, Ordering},
        },
        time::Duration,
    },
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const CRON_SECRET: &str = "cron-test-secret";
pub const BUCKET: &str = "project-files";

pub fn test_settings() -> Settings {
    Settings {
        webhook_secret: WEBHOOK_SECRET.to_string(),
        cron_secret: Some(CRON_SECRET.to_string()),
        order_rate_limit: 1_000,
        ..Settings::default()
    }
}

/// Processor stand-in. Same idempotency key, same intent, like the real one.
#[derive(Default)]
pub struct FakeGateway {
    next: AtomicU32,
    by_key: Mutex<HashMap<String, CreatedIntent>>,
    pub requests: Mutex<Vec<IntentRequest>>,
    pub cancelled: Mutex<Vec<IntentRef>>,
    pub fail_create: AtomicBool,
    /// Makes `create_intent` hang for a minute.
    pub stall: AtomicBool,
}

impl FakeGateway {
    pub fn requests(&self) -> Vec<IntentRequest> {
        self.requests.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<IntentRef> {
        self.cancelled.lock().clone()
    }
}

impl PaymentGateway for FakeGateway {
    fn create_intent(
        &self,
        request: &IntentRequest,
    ) -> BoxFuture<'_, Result<CreatedIntent, MarketError>> {
        let request = request.clone();
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            if self.stall.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(MarketError::ExternalService("card network unavailable".into()));
            }
            let mut by_key = self.by_key.lock();
            let created = by_key
                .entry(request.idempotency_key.clone())
                .or_insert_with(|| {
                    let n = self.next.fetch_add(1, Ordering::SeqCst);
                    CreatedIntent {
                        intent_id: IntentRef::new(format!("pi_test_{n}")).unwrap(),
                        client_secret: format!("pi_test_{n}_secret_abc"),
                    }
                })
                .clone();
            Ok(created)
        })
    }

    fn cancel_intent(&self, intent_id: &IntentRef) -> BoxFuture<'_, Result<(), MarketError>> {
        let intent_id = intent_id.clone();
        Box::pin(async move {
            self.cancelled.lock().push(intent_id);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    raised: Mutex<Vec<IntegrityReport>>,
}

impl RecordingAlerts {
    pub fn raised(&self) -> Vec<IntegrityReport> {
        self.raised.lock().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn raise(&self, report: &IntegrityReport) {
        self.raised.lock().push(report.clone());
    }
}

pub struct TestUser {
    pub principal: Principal,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> UserId {
        self.principal.id
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub auth: Arc<MemoryAuth>,
    pub gateway: Arc<FakeGateway>,
    pub alerts: Arc<RecordingAlerts>,
    pub signer: HmacUrlSigner,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(MemoryAuth::new());
        let gateway = Arc::new(FakeGateway::default());
        let alerts = Arc::new(RecordingAlerts::default());
        let signer = HmacUrlSigner::new(&StorageConfig {
            base_url: "https://files.test/storage/v1".to_string(),
            bucket: BUCKET.to_string(),
            signing_key: "test-signing-key".to_string(),
        });

        let state = AppState {
            store: store.clone(),
            auth: auth.clone(),
            gateway: gateway.clone(),
            blobs: Arc::new(signer.clone()),
            rate_limiter: Arc::new(FixedWindowLimiter::new()),
            alerts: alerts.clone(),
            settings: Arc::new(settings),
        };

        Self {
            state,
            store,
            auth,
            gateway,
            alerts,
            signer,
        }
    }

    pub fn user(&self, email_verified: bool) -> TestUser {
        let id = UserId::new();
        let principal = Principal {
            id,
            email: format!("{id}@example.com"),
            email_verified,
        };
        let token = format!("session-{id}");
        self.auth.add_session(&token, principal.clone());
        TestUser { principal, token }
    }

    pub fn listing(&self, seller: UserId, price: &str) -> Listing {
        self.listing_with(seller, price, Currency::Usd, ListingStatus::Published)
    }

    pub fn listing_with(
        &self,
        seller: UserId,
        price: &str,
        currency: Currency,
        status: ListingStatus,
    ) -> Listing {
        let listing = Listing {
            id: ListingId::new(),
            seller_id: seller,
            title: "Rust starter kit".to_string(),
            price: Decimal::from_str(price).unwrap(),
            currency,
            status,
        };
        self.store.insert_listing(listing.clone());
        listing
    }

    pub fn deliverable(&self, order_id: OrderId, storage_path: &str) -> Deliverable {
        let deliverable = Deliverable {
            id: DeliverableId::new(),
            order_id,
            storage_path: storage_path.to_string(),
            delivered_at: Some(Utc::now()),
        };
        self.store.insert_deliverable(deliverable.clone());
        deliverable
    }

    pub async fn checkout(
        &self,
        buyer: &TestUser,
        listing: &Listing,
    ) -> Result<CheckoutSession, MarketError> {
        start_checkout(
            &self.state,
            Some(&buyer.principal),
            listing.id,
            &RequestContext {
                ip: Some("203.0.113.10".to_string()),
                user_agent: Some("integration-test".to_string()),
            },
        )
        .await
    }

    pub async fn order(&self, id: OrderId) -> Order {
        self.store.find_order(id).await.unwrap().expect("order exists")
    }

    pub fn sign(&self, body: &str) -> String {
        sign(body, WEBHOOK_SECRET)
    }

    pub async fn deliver(&self, body: &str) -> Result<ReconcileOutcome, MarketError> {
        let header = self.sign(body);
        handle_event(&self.state, body, Some(&header)).await
    }

    /// Checkout plus a matching success event: order paid, grant written.
    pub async fn paid_order(&self, buyer: &TestUser, listing: &Listing) -> Order {
        let session = self.checkout(buyer, listing).await.unwrap();
        let order = self.order(session.order_id).await;
        let body = succeeded_event(
            &format!("evt_paid_{}", order.id.as_uuid().simple()),
            &order,
            order.money.amount().minor_units(),
            order.money.currency().as_str(),
        );
        let outcome = self.deliver(&body).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Paid(order.id));
        self.order(order.id).await
    }
}

/// `Stripe-Signature` value for `body`, timestamped now.
pub fn sign(body: &str, secret: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Event envelope with every field the typed model requires.
pub fn event_json(event_id: &str, event_type: &str, object: serde_json::Value) -> String {
    json!({
        "id": event_id,
        "object": "event",
        "api_version": "2024-06-20",
        "type": event_type,
        "created": Utc::now().timestamp(),
        "livemode": false,
        "pending_webhooks": 1,
        "request": {"id": null, "idempotency_key": null},
        "data": {"object": object}
    })
    .to_string()
}

fn metadata(order: &Order) -> serde_json::Value {
    json!({
        "order_id": order.id.to_string(),
        "listing_id": order.listing_id.to_string(),
        "buyer_id": order.buyer_id.to_string(),
    })
}

fn intent_object(order: &Order, amount: i64, currency: &str, status: &str) -> serde_json::Value {
    json!({
        "id": order.payment_intent_id.as_str(),
        "object": "payment_intent",
        "amount": order.money.amount().minor_units(),
        "amount_capturable": 0,
        "amount_received": amount,
        "capture_method": "automatic",
        "confirmation_method": "automatic",
        "created": order.created_at.timestamp(),
        "currency": currency,
        "livemode": false,
        "metadata": metadata(order),
        "payment_method_types": ["card"],
        "status": status,
    })
}

pub fn succeeded_event(event_id: &str, order: &Order, amount: i64, currency: &str) -> String {
    let mut object = intent_object(order, amount, currency, "succeeded");
    object["latest_charge"] = json!("ch_test_1");
    event_json(event_id, "payment_intent.succeeded", object)
}

pub fn failed_event(event_id: &str, order: &Order, message: &str) -> String {
    let mut object = intent_object(
        order,
        0,
        order.money.currency().as_str(),
        "requires_payment_method",
    );
    object["last_payment_error"] = json!({
        "type": "card_error",
        "code": "card_declined",
        "message": message,
    });
    event_json(event_id, "payment_intent.payment_failed", object)
}

pub fn refunded_event(event_id: &str, order: &Order) -> String {
    let amount = order.money.amount().minor_units();
    let object = json!({
        "id": "ch_test_1",
        "object": "charge",
        "amount": amount,
        "amount_captured": amount,
        "amount_refunded": amount,
        "billing_details": {"address": null, "email": null, "name": null, "phone": null},
        "captured": true,
        "created": order.created_at.timestamp(),
        "currency": order.money.currency().as_str(),
        "disputed": false,
        "livemode": false,
        "metadata": {},
        "paid": true,
        "payment_intent": order.payment_intent_id.as_str(),
        "refunded": true,
        "status": "succeeded",
    });
    event_json(event_id, "charge.refunded", object)
}
