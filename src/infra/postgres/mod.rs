pub mod audit_repo;
pub mod deliverable_repo;
pub mod event_repo;
pub mod grant_repo;
pub mod integrity_repo;
pub mod listing_repo;
pub mod order_repo;
pub mod schema_probe;
pub mod session_auth;

use {
    crate::domain::{
        audit::NewAuditEntry,
        deliverable::{Deliverable, DownloadAudit},
        error::MarketError,
        grant::PurchaseGrant,
        id::{DeliverableId, EventId, IntentRef, ListingId, OrderId, UserId},
        listing::Listing,
        order::{NewOrder, Order, OrderStatus, StatusPatch},
        payment_event::{EventClaim, NewPaymentEvent, PaymentEventRecord},
        store::{
            AuditLog, Datastore, DeliverableRepo, EventLedger, GrantRepo, IntegrityRepo,
            ListingRepo, OrderRepo,
        },
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
};

/// Postgres-backed datastore. Multi-row operations run in one transaction
/// each; the uniqueness rules live in the schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ListingRepo for PgStore {
    async fn find_listing(&self, id: ListingId) -> Result<Option<Listing>, MarketError> {
        listing_repo::find_listing(&self.pool, id).await
    }
}

#[async_trait]
impl OrderRepo for PgStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, MarketError> {
        order_repo::find_order(&self.pool, id).await
    }

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, MarketError> {
        order_repo::find_order_by_intent(&self.pool, intent_id).await
    }

    async fn find_in_flight_order(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<Order>, MarketError> {
        order_repo::find_in_flight_order(&self.pool, buyer_id, listing_id).await
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Order, MarketError> {
        order_repo::insert_order(&self.pool, order).await
    }

    async fn attach_intent(
        &self,
        id: OrderId,
        placeholder: &IntentRef,
        intent_id: &IntentRef,
    ) -> Result<bool, MarketError> {
        order_repo::attach_intent(&self.pool, id, placeholder, intent_id).await
    }

    async fn delete_order(&self, id: OrderId) -> Result<(), MarketError> {
        order_repo::delete_order(&self.pool, id).await
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        patch: &StatusPatch,
        audit: Option<&NewAuditEntry>,
    ) -> Result<Option<Order>, MarketError> {
        order_repo::transition_status(&self.pool, id, from, to, patch, audit).await
    }

    async fn apply_payment_success(
        &self,
        id: OrderId,
        charge_id: Option<&str>,
        audit: &NewAuditEntry,
    ) -> Result<Option<(Order, PurchaseGrant)>, MarketError> {
        order_repo::apply_payment_success(&self.pool, id, charge_id, audit).await
    }

    async fn apply_refund(
        &self,
        id: OrderId,
        audit: &NewAuditEntry,
    ) -> Result<Option<Order>, MarketError> {
        order_repo::apply_refund(&self.pool, id, audit).await
    }
}

#[async_trait]
impl GrantRepo for PgStore {
    async fn find_grant(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<PurchaseGrant>, MarketError> {
        grant_repo::find_grant(&self.pool, buyer_id, listing_id).await
    }

    async fn upsert_grant(
        &self,
        buyer_id: UserId,
        listing_id: ListingId,
        order_id: OrderId,
    ) -> Result<PurchaseGrant, MarketError> {
        grant_repo::upsert_grant(&self.pool, buyer_id, listing_id, order_id).await
    }

    async fn delete_grant(&self, buyer_id: UserId, listing_id: ListingId) -> Result<bool, MarketError> {
        grant_repo::delete_grant(&self.pool, buyer_id, listing_id).await
    }
}

#[async_trait]
impl EventLedger for PgStore {
    async fn claim_event(&self, event: &NewPaymentEvent) -> Result<EventClaim, MarketError> {
        event_repo::claim_event(&self.pool, event).await
    }

    async fn mark_processed(&self, event_id: &EventId) -> Result<(), MarketError> {
        event_repo::mark_processed(&self.pool, event_id).await
    }

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), MarketError> {
        event_repo::mark_failed(&self.pool, event_id, error).await
    }

    async fn find_event(&self, event_id: &EventId) -> Result<Option<PaymentEventRecord>, MarketError> {
        event_repo::find_event(&self.pool, event_id).await
    }
}

#[async_trait]
impl DeliverableRepo for PgStore {
    async fn find_deliverable(&self, id: DeliverableId) -> Result<Option<Deliverable>, MarketError> {
        deliverable_repo::find_deliverable(&self.pool, id).await
    }

    async fn record_download(&self, audit: &DownloadAudit) -> Result<(), MarketError> {
        deliverable_repo::record_download(&self.pool, audit).await
    }
}

#[async_trait]
impl AuditLog for PgStore {
    async fn record(&self, entry: &NewAuditEntry) -> Result<(), MarketError> {
        audit_repo::insert_audit_entry(&self.pool, entry).await
    }
}

#[async_trait]
impl IntegrityRepo for PgStore {
    async fn paid_orders_missing_grants(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, MarketError> {
        integrity_repo::paid_orders_missing_grants(&self.pool, since).await
    }

    async fn grants_without_paid_order(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, MarketError> {
        integrity_repo::grants_without_paid_order(&self.pool, since).await
    }

    async fn deliverables_without_paid_order(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliverableId>, MarketError> {
        integrity_repo::deliverables_without_paid_order(&self.pool, since).await
    }

    async fn stale_received_events(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventId>, MarketError> {
        integrity_repo::stale_received_events(&self.pool, older_than, limit).await
    }
}

#[async_trait]
impl Datastore for PgStore {
    async fn ping(&self) -> Result<(), MarketError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
