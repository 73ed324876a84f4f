//! Races against the Postgres store. The uniqueness rules are enforced by
//! the schema, so these need a live server:
//! `cargo test --test pg_concurrency_test -- --ignored`

mod common;

use common::pg::*;
use market_core::domain::audit::ACTOR_WEBHOOK;
use market_core::domain::error::{MarketError, PurchaseRejection};
use market_core::domain::id::{EventId, IntentRef, ListingId, OrderId};
use market_core::domain::listing::ListingStatus;
use market_core::domain::order::{NewOrder, OrderStatus};
use market_core::domain::payment_event::{EventClaim, EventStatus, NewPaymentEvent};
use market_core::domain::store::{EventLedger, GrantRepo, ListingRepo, OrderRepo};
use market_core::infra::postgres::PgStore;
use rust_decimal::Decimal;
use serde_json::json;

const DB: &str = "market_core_test_pg_concurrency";
const RACERS: usize = 8;

async fn store() -> PgStore {
    PgStore::new(setup_pool(DB).await)
}

async fn pending_order(store: &PgStore) -> (NewOrder, ListingId) {
    let pool = store.pool();
    let seller = insert_user(pool, true).await;
    let buyer = insert_user(pool, true).await;
    let listing_id = ListingId::from_uuid(
        insert_listing(pool, seller, Decimal::new(4900, 2), ListingStatus::Published).await,
    );
    let listing = store.find_listing(listing_id).await.unwrap().unwrap();
    (NewOrder::for_listing(buyer, &listing).unwrap(), listing_id)
}

// ── 1. concurrent_order_inserts ────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires postgres"]
async fn racing_inserts_leave_one_in_flight_order() {
    let store = store().await;
    let (new_order, listing_id) = pending_order(&store).await;

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let store = store.clone();
        let attempt = NewOrder {
            id: OrderId::new(),
            payment_intent_id: IntentRef::placeholder(),
            ..new_order.clone()
        };
        handles.push(tokio::spawn(async move { store.insert_order(&attempt).await }));
    }

    let (mut inserted, mut in_progress) = (0, 0);
    for h in handles {
        match h.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::Pending);
                inserted += 1;
            }
            Err(MarketError::Purchase(PurchaseRejection::OrderInProgress)) => in_progress += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(in_progress, RACERS - 1);

    let rows = count_rows(
        store.pool(),
        "SELECT COUNT(*) FROM orders WHERE listing_id = $1",
        listing_id.as_uuid(),
    )
    .await;
    assert_eq!(rows, 1);
}

// ── 2. concurrent_event_claims ─────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires postgres"]
async fn racing_claims_admit_one_delivery() {
    let store = store().await;
    let event_id = EventId::new(format!("evt_race_{}", uuid::Uuid::now_v7().simple())).unwrap();

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let store = store.clone();
        let event = NewPaymentEvent {
            event_id: event_id.clone(),
            event_type: "payment_intent.succeeded".to_string(),
            payload: json!({ "id": event_id.as_str() }),
        };
        handles.push(tokio::spawn(async move { store.claim_event(&event).await }));
    }

    let mut claimed = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            EventClaim::Claimed => claimed += 1,
            EventClaim::AlreadyHandled => {}
        }
    }
    assert_eq!(claimed, 1);

    let event = store.find_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Received);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires postgres"]
async fn racing_reclaims_of_a_failed_event_admit_one_retry() {
    let store = store().await;
    let event_id = EventId::new(format!("evt_retry_{}", uuid::Uuid::now_v7().simple())).unwrap();
    let event = NewPaymentEvent {
        event_id: event_id.clone(),
        event_type: "charge.refunded".to_string(),
        payload: json!({ "id": event_id.as_str() }),
    };
    assert_eq!(store.claim_event(&event).await.unwrap(), EventClaim::Claimed);
    store.mark_failed(&event_id, "db timeout").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let (store, event) = (store.clone(), event.clone());
        handles.push(tokio::spawn(async move { store.claim_event(&event).await }));
    }

    let mut claimed = 0;
    for h in handles {
        if h.await.unwrap().unwrap() == EventClaim::Claimed {
            claimed += 1;
        }
    }
    assert_eq!(claimed, 1);
}

// ── 3. concurrent_settlement ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires postgres"]
async fn racing_settlements_write_one_grant() {
    let store = store().await;
    let (new_order, listing_id) = pending_order(&store).await;
    let order = store.insert_order(&new_order).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let (store, order) = (store.clone(), order.clone());
        handles.push(tokio::spawn(async move {
            let entry = order.audit_entry(ACTOR_WEBHOOK, "payment_completed");
            store.apply_payment_success(order.id, Some("ch_race"), &entry).await
        }));
    }

    let mut settled = 0;
    for h in handles {
        if h.await.unwrap().unwrap().is_some() {
            settled += 1;
        }
    }
    assert_eq!(settled, 1);

    let grant = store.find_grant(order.buyer_id, listing_id).await.unwrap();
    assert_eq!(grant.map(|g| g.order_id), Some(order.id));
    let audits = count_rows(
        store.pool(),
        "SELECT COUNT(*) FROM audit_log WHERE resource_id = $1 AND action = 'payment_completed'",
        order.id.as_uuid(),
    )
    .await;
    assert_eq!(audits, 1);
}
