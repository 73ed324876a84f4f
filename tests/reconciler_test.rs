mod common;

use common::*;
use market_core::domain::error::{DenyReason, MarketError};
use market_core::domain::id::EventId;
use market_core::domain::order::OrderStatus;
use market_core::domain::payment_event::{EventStatus, ReconcileOutcome, SkipReason};
use market_core::domain::store::EventLedger;
use market_core::infra::memory::FaultPoint;
use market_core::services::download_gate::resolve_download;
use market_core::services::reconciler::handle_event;
use serde_json::json;

async fn event_status(app: &TestApp, id: &str) -> Option<EventStatus> {
    app.store
        .find_event(&EventId::new(id).unwrap())
        .await
        .unwrap()
        .map(|e| e.status)
}

// ── 1. success_marks_paid_and_grants_access ────────────────────────────────

#[tokio::test]
async fn success_marks_paid_and_grants_access() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let outcome = app
        .deliver(&succeeded_event("evt_ok_1", &order, 4900, "usd"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Paid(order.id));

    let paid = app.order(order.id).await;
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.charge_id.as_deref(), Some("ch_test_1"));
    assert!(paid.paid_at.is_some());
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
    assert_eq!(app.store.audit_actions("payment_completed"), 1);
    assert_eq!(event_status(&app, "evt_ok_1").await, Some(EventStatus::Processed));
}

// ── 2. redelivery_is_a_no_op ───────────────────────────────────────────────

#[tokio::test]
async fn redelivery_is_a_no_op() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let body = succeeded_event("evt_redeliver", &order, 4900, "usd");
    assert_eq!(app.deliver(&body).await.unwrap(), ReconcileOutcome::Paid(order.id));
    assert_eq!(app.deliver(&body).await.unwrap(), ReconcileOutcome::Duplicate);

    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
    assert_eq!(app.store.audit_actions("payment_completed"), 1);
    assert_eq!(app.store.event_count(), 1);
}

#[tokio::test]
async fn second_success_event_for_paid_order_is_already_paid() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let order = app.paid_order(&buyer, &listing).await;

    let outcome = app
        .deliver(&succeeded_event("evt_other_id", &order, 4900, "usd"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::AlreadyPaid(order.id));
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
}

// ── 3. signature_checks ────────────────────────────────────────────────────

#[tokio::test]
async fn tampered_body_is_rejected_before_the_ledger() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let body = succeeded_event("evt_tampered", &order, 4900, "usd");
    let header = app.sign(&body);
    let tampered = body.replace("4900", "1");

    let result = handle_event(&app.state, &tampered, Some(&header)).await;
    assert!(matches!(result, Err(MarketError::WebhookSignature(_))));
    assert_eq!(app.store.event_count(), 0);
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::new();
    let body = event_json("evt_x", "ping", json!({}));
    let result = handle_event(&app.state, &body, None).await;
    assert!(matches!(result, Err(MarketError::WebhookSignature(_))));
    assert_eq!(app.store.event_count(), 0);
}

// ── 4. failure_events ──────────────────────────────────────────────────────

#[tokio::test]
async fn failure_on_pending_order_marks_it_failed() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let outcome = app
        .deliver(&failed_event("evt_fail", &order, "Your card was declined."))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::MarkedFailed(order.id));

    let failed = app.order(order.id).await;
    assert_eq!(failed.status, OrderStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("Your card was declined."));
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 0);
    assert_eq!(app.store.audit_actions("payment_failed"), 1);
}

#[tokio::test]
async fn failure_after_success_never_downgrades() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let order = app.paid_order(&buyer, &listing).await;

    let outcome = app
        .deliver(&failed_event("evt_late_fail", &order, "declined"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            order_id: Some(order.id),
            reason: SkipReason::NotPending(OrderStatus::Paid),
        }
    );
    assert_eq!(app.order(order.id).await.status, OrderStatus::Paid);
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
    assert_eq!(event_status(&app, "evt_late_fail").await, Some(EventStatus::Processed));
}

// ── 5. refunds ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn refund_revokes_access() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let order = app.paid_order(&buyer, &listing).await;
    let deliverable = app.deliverable(order.id, "kits/starter.zip");

    let outcome = app
        .deliver(&refunded_event("evt_refund", &order))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Refunded(order.id));

    let refunded = app.order(order.id).await;
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert!(refunded.refunded_at.is_some());
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 0);
    assert_eq!(app.store.audit_actions("payment_refunded"), 1);

    let result = resolve_download(
        &app.state,
        Some(&buyer.principal),
        deliverable.id,
        None,
        &Default::default(),
    )
    .await;
    assert!(matches!(result, Err(MarketError::AccessDenied(DenyReason::NoGrant))));
}

#[tokio::test]
async fn refund_for_pending_order_is_skipped() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let outcome = app
        .deliver(&refunded_event("evt_early_refund", &order))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            order_id: Some(order.id),
            reason: SkipReason::NotPaid(OrderStatus::Pending),
        }
    );
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);
}

// ── 6. anomalies_are_acknowledged_without_state_change ─────────────────────

#[tokio::test]
async fn intent_mismatch_is_skipped() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let body = succeeded_event("evt_wrong_pi", &order, 4900, "usd")
        .replace(order.payment_intent_id.as_str(), "pi_someone_else");
    let outcome = app.deliver(&body).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped { reason: SkipReason::IntentMismatch { .. }, .. }
    ));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 0);
}

#[tokio::test]
async fn currency_mismatch_is_skipped() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let outcome = app
        .deliver(&succeeded_event("evt_eur", &order, 4900, "eur"))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped { reason: SkipReason::CurrencyMismatch { .. }, .. }
    ));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn amount_mismatch_is_logged_but_not_blocking() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let outcome = app
        .deliver(&succeeded_event("evt_short", &order, 4500, "usd"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Paid(order.id));
    assert_eq!(app.store.audit_actions("payment_amount_mismatch"), 1);
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
}

#[tokio::test]
async fn unknown_order_is_skipped() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;

    let body = succeeded_event("evt_ghost", &order, 4900, "usd")
        .replace(&order.id.to_string(), "0190b7a4-0000-7000-8000-000000000000");
    let outcome = app.deliver(&body).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped { order_id: None, reason: SkipReason::OrderNotFound }
    );
}

#[tokio::test]
async fn unhandled_type_is_acknowledged() {
    let app = TestApp::new();
    let body = event_json(
        "evt_customer",
        "customer.created",
        json!({"id": "cus_1", "object": "customer"}),
    );

    assert_eq!(app.deliver(&body).await.unwrap(), ReconcileOutcome::Unhandled);
    assert_eq!(event_status(&app, "evt_customer").await, Some(EventStatus::Processed));
}

#[tokio::test]
async fn malformed_known_type_is_skipped() {
    let app = TestApp::new();
    let body = event_json(
        "evt_broken",
        "payment_intent.succeeded",
        json!({"object": "payment_intent", "amount": "lots"}),
    );

    let outcome = app.deliver(&body).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped { reason: SkipReason::Malformed(_), .. }
    ));
    assert_eq!(event_status(&app, "evt_broken").await, Some(EventStatus::Processed));
}

// ── 7. failed_processing_is_retried ────────────────────────────────────────

#[tokio::test]
async fn failed_apply_is_reclaimed_on_retry() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;
    let body = succeeded_event("evt_retry", &order, 4900, "usd");

    app.store.inject_fault(FaultPoint::ApplyPaymentSuccess);
    assert!(app.deliver(&body).await.is_err());
    assert_eq!(event_status(&app, "evt_retry").await, Some(EventStatus::Failed));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 0);

    assert_eq!(app.deliver(&body).await.unwrap(), ReconcileOutcome::Paid(order.id));
    assert_eq!(event_status(&app, "evt_retry").await, Some(EventStatus::Processed));
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
}

#[tokio::test]
async fn failed_ledger_close_is_reclaimed_without_double_grant() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;
    let body = succeeded_event("evt_close", &order, 4900, "usd");

    app.store.inject_fault(FaultPoint::MarkProcessed);
    assert!(app.deliver(&body).await.is_err());
    assert_eq!(event_status(&app, "evt_close").await, Some(EventStatus::Failed));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Paid);

    assert_eq!(
        app.deliver(&body).await.unwrap(),
        ReconcileOutcome::AlreadyPaid(order.id)
    );
    assert_eq!(event_status(&app, "evt_close").await, Some(EventStatus::Processed));
    assert_eq!(app.store.grant_count(buyer.id(), listing.id), 1);
    assert_eq!(app.store.audit_actions("payment_completed"), 1);
}

#[tokio::test]
async fn ledger_outage_fails_the_delivery() {
    let app = TestApp::new();
    let seller = app.user(true);
    let buyer = app.user(true);
    let listing = app.listing(seller.id(), "49.00");
    let session = app.checkout(&buyer, &listing).await.unwrap();
    let order = app.order(session.order_id).await;
    let body = succeeded_event("evt_outage", &order, 4900, "usd");

    app.store.inject_fault(FaultPoint::ClaimEvent);
    assert!(matches!(app.deliver(&body).await, Err(MarketError::Store(_))));
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pending);

    assert_eq!(app.deliver(&body).await.unwrap(), ReconcileOutcome::Paid(order.id));
}
