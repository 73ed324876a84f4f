//! Single-process datastore with the same constraint semantics as the
//! Postgres schema. Every operation runs under one lock, so the
//! multi-statement operations are atomic the way a transaction would be.

use {
    crate::domain::{
        audit::NewAuditEntry,
        deliverable::{Deliverable, DownloadAudit},
        error::{MarketError, PurchaseRejection},
        grant::PurchaseGrant,
        id::{DeliverableId, EventId, IntentRef, ListingId, OrderId, UserId},
        listing::{Listing, ListingStatus},
        order::{NewOrder, Order, OrderStatus, StatusPatch},
        payment_event::{EventClaim, EventStatus, NewPaymentEvent, PaymentEventRecord},
        principal::{AuthProvider, Credentials, Principal},
        store::{
            AuditLog, Datastore, DeliverableRepo, EventLedger, GrantRepo, IntegrityRepo,
            ListingRepo, OrderRepo,
        },
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    parking_lot::Mutex,
    std::collections::{BTreeMap, HashMap, HashSet},
};

/// Operations that can be made to fail once, to exercise rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    AttachIntent,
    ApplyPaymentSuccess,
    ClaimEvent,
    MarkProcessed,
    RecordDownload,
}

#[derive(Default)]
struct Tables {
    listings: HashMap<ListingId, Listing>,
    orders: BTreeMap<OrderId, Order>,
    grants: HashMap<(UserId, ListingId), PurchaseGrant>,
    deliverables: HashMap<DeliverableId, Deliverable>,
    events: HashMap<EventId, PaymentEventRecord>,
    downloads: Vec<DownloadAudit>,
    audit: Vec<NewAuditEntry>,
    faults: HashSet<FaultPoint>,
}

impl Tables {
    fn take_fault(&mut self, point: FaultPoint) -> Result<(), MarketError> {
        if self.faults.remove(&point) {
            return Err(MarketError::Store(format!("injected fault: {point:?}")));
        }
        Ok(())
    }

    fn cas_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Option<&mut Order> {
        let order = self.orders.get_mut(&id)?;
        if order.status != from {
            return None;
        }
        order.status = to;
        order.updated_at = now;
        Some(order)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.tables.lock().listings.insert(listing.id, listing);
    }

    pub fn set_listing_status(&self, id: ListingId, status: ListingStatus) {
        if let Some(listing) = self.tables.lock().listings.get_mut(&id) {
            listing.status = status;
        }
    }

    pub fn insert_deliverable(&self, deliverable: Deliverable) {
        self.tables.lock().deliverables.insert(deliverable.id, deliverable);
    }

    /// Next call through `point` fails with a store error.
    pub fn inject_fault(&self, point: FaultPoint) {
        self.tables.lock().faults.insert(point);
    }

    /// Removes a grant behind the service's back, as a manual DB edit would.
    pub fn remove_grant_row(&self, buyer_id: UserId, listing_id: ListingId) -> bool {
        self.tables.lock().grants.remove(&(buyer_id, listing_id)).is_some()
    }

    /// Forces an order's status without any transition rules.
    pub fn force_order_status(&self, id: OrderId, status: OrderStatus) {
        if let Some(order) = self.tables.lock().orders.get_mut(&id) {
            order.status = status;
        }
    }

    pub fn backdate_event(&self, event_id: &EventId, received_at: DateTime<Utc>) {
        if let Some(event) = self.tables.lock().events.get_mut(event_id) {
            event.received_at = received_at;
        }
    }

    pub fn orders_for(&self, buyer_id: UserId, listing_id: ListingId) -> Vec<Order> {
        self.tables
            .lock()
            .orders
            .values()
            .filter(|o| o.buyer_id == buyer_id && o.listing_id == listing_id)
            .cloned()
            .collect()
    }

    pub fn grant_count(&self, buyer_id: UserId, listing_id: ListingId) -> usize {
        self.tables
            .lock()
            .grants
            .keys()
            .filter(|(b, l)| *b == buyer_id && *l == listing_id)
            .count()
    }

    pub fn audit_entries(&self) -> Vec<NewAuditEntry> {
        self.tables.lock().audit.clone()
    }

    pub fn audit_actions(&self, action: &str) -> usize {
        self.tables
            .lock()
            .audit
            .iter()
            .filter(|a| a.action == action)
            .count()
    }

    pub fn downloads(&self) -> Vec<DownloadAudit> {
        self.tables.lock().downloads.clone()
    }

    pub fn event_count(&self) -> usize {
        self.tables.lock().events.len()
    }
}

#[async_trait]
impl ListingRepo for MemoryStore {
    async fn find_listing(&self, id: ListingId) -> Result<Option<Listing>, MarketError> {
        Ok(self.tables.lock().listings.get(&id).cloned())
    }
}

#[async_trait]
impl OrderRepo for MemoryStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, MarketError> {
        Ok(self.tables.lock().orders.get(&id).cloned())
    }

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, MarketError> {
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .find(|o| o.payment_intent_id.as_str() == intent_id)
            .cloned())
    }

    async fn find_in_flight_order(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<Order>, MarketError> {
        Ok(self
            .tables
            .lock()
            .orders
            .values()
            .find(|o| o.buyer_id == buyer_id && o.listing_id == listing_id && o.status.is_in_flight())
            .cloned())
    }

    async fn insert_order(&self, new: &NewOrder) -> Result<Order, MarketError> {
        let mut t = self.tables.lock();

        // orders_one_in_flight_per_buyer
        let clash = t.orders.values().any(|o| {
            o.buyer_id == new.buyer_id && o.listing_id == new.listing_id && o.status.is_in_flight()
        });
        if clash {
            return Err(MarketError::Purchase(PurchaseRejection::OrderInProgress));
        }
        // orders_payment_intent_id_key
        if t
            .orders
            .values()
            .any(|o| o.payment_intent_id == new.payment_intent_id)
        {
            return Err(MarketError::Store(format!(
                "duplicate payment_intent_id {}",
                new.payment_intent_id
            )));
        }

        let now = Utc::now();
        let order = Order {
            id: new.id,
            listing_id: new.listing_id,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            money: new.money,
            payment_intent_id: new.payment_intent_id.clone(),
            charge_id: None,
            status: OrderStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            refunded_at: None,
        };
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn attach_intent(
        &self,
        id: OrderId,
        placeholder: &IntentRef,
        intent_id: &IntentRef,
    ) -> Result<bool, MarketError> {
        let mut t = self.tables.lock();
        t.take_fault(FaultPoint::AttachIntent)?;
        if t
            .orders
            .values()
            .any(|o| o.id != id && o.payment_intent_id == *intent_id)
        {
            return Err(MarketError::Store(format!("duplicate payment_intent_id {intent_id}")));
        }
        match t.orders.get_mut(&id) {
            Some(order) if order.payment_intent_id == *placeholder => {
                order.payment_intent_id = intent_id.clone();
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_order(&self, id: OrderId) -> Result<(), MarketError> {
        let mut t = self.tables.lock();
        t.orders.remove(&id);
        t.deliverables.retain(|_, d| d.order_id != id);
        Ok(())
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        patch: &StatusPatch,
        audit: Option<&NewAuditEntry>,
    ) -> Result<Option<Order>, MarketError> {
        let mut t = self.tables.lock();
        let now = Utc::now();
        let Some(order) = t.cas_status(id, from, to, now) else {
            return Ok(None);
        };
        if patch.charge_id.is_some() {
            order.charge_id = patch.charge_id.clone();
        }
        if patch.failure_reason.is_some() {
            order.failure_reason = patch.failure_reason.clone();
        }
        match to {
            OrderStatus::Paid => order.paid_at = Some(now),
            OrderStatus::Refunded => order.refunded_at = Some(now),
            OrderStatus::Pending | OrderStatus::Failed => {}
        }
        let order = order.clone();
        if let Some(entry) = audit {
            t.audit.push(entry.clone());
        }
        Ok(Some(order))
    }

    async fn apply_payment_success(
        &self,
        id: OrderId,
        charge_id: Option<&str>,
        audit: &NewAuditEntry,
    ) -> Result<Option<(Order, PurchaseGrant)>, MarketError> {
        let mut t = self.tables.lock();
        t.take_fault(FaultPoint::ApplyPaymentSuccess)?;
        let now = Utc::now();
        let Some(order) = t.cas_status(id, OrderStatus::Pending, OrderStatus::Paid, now) else {
            return Ok(None);
        };
        order.charge_id = charge_id.map(str::to_string);
        order.paid_at = Some(now);
        let order = order.clone();

        let grant = t
            .grants
            .entry((order.buyer_id, order.listing_id))
            .and_modify(|g| g.order_id = order.id)
            .or_insert_with(|| PurchaseGrant {
                buyer_id: order.buyer_id,
                listing_id: order.listing_id,
                order_id: order.id,
                created_at: now,
            })
            .clone();
        t.audit.push(audit.clone());
        Ok(Some((order, grant)))
    }

    async fn apply_refund(
        &self,
        id: OrderId,
        audit: &NewAuditEntry,
    ) -> Result<Option<Order>, MarketError> {
        let mut t = self.tables.lock();
        let now = Utc::now();
        let Some(order) = t.cas_status(id, OrderStatus::Paid, OrderStatus::Refunded, now) else {
            return Ok(None);
        };
        order.refunded_at = Some(now);
        let order = order.clone();
        t.grants.remove(&(order.buyer_id, order.listing_id));
        t.audit.push(audit.clone());
        Ok(Some(order))
    }
}

#[async_trait]
impl GrantRepo for MemoryStore {
    async fn find_grant(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<PurchaseGrant>, MarketError> {
        Ok(self.tables.lock().grants.get(&(buyer_id, listing_id)).cloned())
    }

    async fn upsert_grant(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
        order_id: OrderId,
    ) -> Result<PurchaseGrant, MarketError> {
        let mut t = self.tables.lock();
        let grant = t
            .grants
            .entry((buyer_id, listing_id))
            .and_modify(|g| g.order_id = order_id)
            .or_insert_with(|| PurchaseGrant {
                buyer_id,
                listing_id,
                order_id,
                created_at: Utc::now(),
            });
        Ok(grant.clone())
    }

    async fn delete_grant(&self, buyer_id: UserId, listing_id: ListingId) -> Result<bool, MarketError> {
        Ok(self.tables.lock().grants.remove(&(buyer_id, listing_id)).is_some())
    }
}

#[async_trait]
impl EventLedger for MemoryStore {
    async fn claim_event(&self, event: &NewPaymentEvent) -> Result<EventClaim, MarketError> {
        let mut t = self.tables.lock();
        t.take_fault(FaultPoint::ClaimEvent)?;
        let now = Utc::now();
        match t.events.get_mut(&event.event_id) {
            Some(existing) if existing.status == EventStatus::Failed => {
                existing.status = EventStatus::Received;
                existing.received_at = now;
                existing.processed_at = None;
                Ok(EventClaim::Claimed)
            }
            Some(_) => Ok(EventClaim::AlreadyHandled),
            None => {
                t.events.insert(
                    event.event_id.clone(),
                    PaymentEventRecord {
                        event_id: event.event_id.clone(),
                        event_type: event.event_type.clone(),
                        status: EventStatus::Received,
                        error: None,
                        payload: event.payload.clone(),
                        received_at: now,
                        processed_at: None,
                    },
                );
                Ok(EventClaim::Claimed)
            }
        }
    }

    async fn mark_processed(&self, event_id: &EventId) -> Result<(), MarketError> {
        let mut t = self.tables.lock();
        t.take_fault(FaultPoint::MarkProcessed)?;
        if let Some(event) = t.events.get_mut(event_id) {
            event.status = EventStatus::Processed;
            event.error = None;
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), MarketError> {
        if let Some(event) = self.tables.lock().events.get_mut(event_id) {
            event.status = EventStatus::Failed;
            event.error = Some(error.to_string());
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_event(&self, event_id: &EventId) -> Result<Option<PaymentEventRecord>, MarketError> {
        Ok(self.tables.lock().events.get(event_id).cloned())
    }
}

#[async_trait]
impl DeliverableRepo for MemoryStore {
    async fn find_deliverable(&self, id: DeliverableId) -> Result<Option<Deliverable>, MarketError> {
        Ok(self.tables.lock().deliverables.get(&id).cloned())
    }

    async fn record_download(&self, audit: &DownloadAudit) -> Result<(), MarketError> {
        let mut t = self.tables.lock();
        t.take_fault(FaultPoint::RecordDownload)?;
        t.downloads.push(audit.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn record(&self, entry: &NewAuditEntry) -> Result<(), MarketError> {
        self.tables.lock().audit.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl IntegrityRepo for MemoryStore {
    async fn paid_orders_missing_grants(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, MarketError> {
        let t = self.tables.lock();
        Ok(t.orders
            .values()
            .filter(|o| o.status == OrderStatus::Paid && o.created_at >= since)
            .filter(|o| {
                !t.grants
                    .get(&(o.buyer_id, o.listing_id))
                    .is_some_and(|g| g.order_id == o.id)
            })
            .map(|o| o.id)
            .collect())
    }

    async fn grants_without_paid_order(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, MarketError> {
        let t = self.tables.lock();
        let mut ids: Vec<OrderId> = t
            .grants
            .values()
            .filter(|g| g.created_at >= since)
            .filter(|g| {
                t.orders
                    .get(&g.order_id)
                    .is_none_or(|o| o.status != OrderStatus::Paid)
            })
            .map(|g| g.order_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn deliverables_without_paid_order(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliverableId>, MarketError> {
        let t = self.tables.lock();
        let mut ids: Vec<DeliverableId> = t
            .deliverables
            .values()
            .filter(|d| d.delivered_at.is_some_and(|at| at >= since))
            .filter(|d| {
                t.orders
                    .get(&d.order_id)
                    .is_none_or(|o| o.status != OrderStatus::Paid)
            })
            .map(|d| d.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn stale_received_events(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventId>, MarketError> {
        let t = self.tables.lock();
        let mut stale: Vec<&PaymentEventRecord> = t
            .events
            .values()
            .filter(|e| e.status == EventStatus::Received && e.received_at < older_than)
            .collect();
        stale.sort_by_key(|e| e.received_at);
        Ok(stale
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|e| e.event_id.clone())
            .collect())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn ping(&self) -> Result<(), MarketError> {
        Ok(())
    }
}

/// Session-token table for tests and local runs.
#[derive(Default)]
pub struct MemoryAuth {
    sessions: Mutex<HashMap<String, Principal>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, token: &str, principal: Principal) {
        self.sessions.lock().insert(token.to_string(), principal);
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, MarketError> {
        let Credentials::SessionToken(token) = credentials;
        self.sessions
            .lock()
            .get(token)
            .cloned()
            .ok_or(MarketError::Authentication)
    }
}
