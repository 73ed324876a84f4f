//! Datastore contract. Every invariant that must hold across concurrent
//! requests is enforced by the backend's constraints (unique indexes,
//! conditional updates, transactions), not by callers.

use {
    super::audit::NewAuditEntry,
    super::deliverable::{Deliverable, DownloadAudit},
    super::error::MarketError,
    super::grant::PurchaseGrant,
    super::id::{DeliverableId, EventId, IntentRef, ListingId, OrderId, UserId},
    super::listing::Listing,
    super::order::{NewOrder, Order, OrderStatus, StatusPatch},
    super::payment_event::{EventClaim, NewPaymentEvent, PaymentEventRecord},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

#[async_trait]
pub trait ListingRepo: Send + Sync {
    async fn find_listing(&self, id: ListingId) -> Result<Option<Listing>, MarketError>;
}

#[async_trait]
pub trait OrderRepo: Send + Sync {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, MarketError>;

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, MarketError>;

    /// The `pending` or `paid` order for this pair, if any.
    async fn find_in_flight_order(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<Order>, MarketError>;

    /// Inserts a `pending` order. Losing the race on the one-in-flight
    /// uniqueness rule yields `Purchase(OrderInProgress)`.
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, MarketError>;

    /// Swaps the placeholder intent id for the processor's. Returns `false`
    /// when the order is gone or no longer carries `placeholder`.
    async fn attach_intent(
        &self,
        id: OrderId,
        placeholder: &IntentRef,
        intent_id: &IntentRef,
    ) -> Result<bool, MarketError>;

    /// Rollback path only.
    async fn delete_order(&self, id: OrderId) -> Result<(), MarketError>;

    /// Applies `from -> to` only if the order is currently in `from`;
    /// otherwise a silent no-op returning `None`. The audit entry commits
    /// with the change.
    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        patch: &StatusPatch,
        audit: Option<&NewAuditEntry>,
    ) -> Result<Option<Order>, MarketError>;

    /// Atomically: pending -> paid, grant upsert on (buyer, listing), audit.
    /// `None` when the order was not pending.
    async fn apply_payment_success(
        &self,
        id: OrderId,
        charge_id: Option<&str>,
        audit: &NewAuditEntry,
    ) -> Result<Option<(Order, PurchaseGrant)>, MarketError>;

    /// Atomically: paid -> refunded, grant removal, audit.
    /// `None` when the order was not paid.
    async fn apply_refund(
        &self,
        id: OrderId,
        audit: &NewAuditEntry,
    ) -> Result<Option<Order>, MarketError>;
}

#[async_trait]
pub trait GrantRepo: Send + Sync {
    async fn find_grant(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<PurchaseGrant>, MarketError>;

    /// Upsert keyed on (buyer, listing); replays never add a second row.
    async fn upsert_grant(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
        order_id: OrderId,
    ) -> Result<PurchaseGrant, MarketError>;

    async fn delete_grant(&self, buyer_id: UserId, listing_id: ListingId) -> Result<bool, MarketError>;
}

/// Idempotency ledger for processor events.
#[async_trait]
pub trait EventLedger: Send + Sync {
    async fn claim_event(&self, event: &NewPaymentEvent) -> Result<EventClaim, MarketError>;

    async fn mark_processed(&self, event_id: &EventId) -> Result<(), MarketError>;

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), MarketError>;

    async fn find_event(&self, event_id: &EventId) -> Result<Option<PaymentEventRecord>, MarketError>;
}

#[async_trait]
pub trait DeliverableRepo: Send + Sync {
    async fn find_deliverable(&self, id: DeliverableId) -> Result<Option<Deliverable>, MarketError>;

    async fn record_download(&self, audit: &DownloadAudit) -> Result<(), MarketError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: &NewAuditEntry) -> Result<(), MarketError>;
}

/// Read-only scans behind the integrity job.
#[async_trait]
pub trait IntegrityRepo: Send + Sync {
    async fn paid_orders_missing_grants(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, MarketError>;

    async fn grants_without_paid_order(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, MarketError>;

    async fn deliverables_without_paid_order(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliverableId>, MarketError>;

    async fn stale_received_events(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventId>, MarketError>;
}

#[async_trait]
pub trait Datastore:
    ListingRepo + OrderRepo + GrantRepo + EventLedger + DeliverableRepo + AuditLog + IntegrityRepo
{
    async fn ping(&self) -> Result<(), MarketError>;
}
