//! Applies verified processor events to orders and grants exactly once.

use {
    crate::{
        AppState,
        adapters::stripe::event::construct_event,
        domain::{
            audit::ACTOR_WEBHOOK,
            error::MarketError,
            id::OrderId,
            order::{Order, OrderStatus, StatusPatch},
            payment_event::{
                ChargeSnapshot, EventClaim, IntentMetadata, IntentSnapshot, NewPaymentEvent,
                PaymentEventKind, ReconcileOutcome, SkipReason, VerifiedEvent,
            },
            store::Datastore,
        },
        services::order_ledger::update_order_status,
    },
    serde_json::json,
};

/// Full webhook path: signature, ledger claim, dispatch, ledger close.
///
/// `Err` means the processor should see a non-200: `WebhookSignature` and
/// `Validation` before anything is written, anything else once the event
/// is in the ledger (it is marked `failed` so the retry is reclaimed).
#[tracing::instrument(
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn handle_event(
    state: &AppState,
    raw_body: &str,
    signature_header: Option<&str>,
) -> Result<ReconcileOutcome, MarketError> {
    let header = signature_header
        .ok_or_else(|| MarketError::WebhookSignature("missing Stripe-Signature header".into()))?;
    let event = construct_event(raw_body, header, &state.settings.webhook_secret)?;
    let span = tracing::Span::current();
    span.record("event_id", event.id.as_str());
    span.record("event_type", event.event_type.as_str());

    let claim = state
        .store
        .claim_event(&NewPaymentEvent {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            payload: event.raw.clone(),
        })
        .await?;

    if claim == EventClaim::AlreadyHandled {
        tracing::info!("duplicate event, skipping");
        return Ok(ReconcileOutcome::Duplicate);
    }

    match apply_event(state.store.as_ref(), &event).await {
        Ok(outcome) => {
            if let Err(e) = state.store.mark_processed(&event.id).await {
                tracing::error!(error = %e, outcome = outcome.label(), "failed to mark event processed");
                // Handlers are idempotent, so a reclaimed retry is harmless.
                record_failure(state.store.as_ref(), &event, &e).await;
                return Err(e);
            }
            tracing::info!(outcome = outcome.label(), "event processed");
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!(error = %e, "event processing failed");
            record_failure(state.store.as_ref(), &event, &e).await;
            Err(e)
        }
    }
}

async fn record_failure(store: &dyn Datastore, event: &VerifiedEvent, error: &MarketError) {
    if let Err(e) = store.mark_failed(&event.id, &error.to_string()).await {
        tracing::error!(error = %e, "failed to mark event failed; it stays received");
    }
}

/// Dispatches a claimed event. Anomalies come back as `Skipped` so the
/// event is still acknowledged; only infrastructure failures are `Err`.
pub async fn apply_event(
    store: &dyn Datastore,
    event: &VerifiedEvent,
) -> Result<ReconcileOutcome, MarketError> {
    match &event.kind {
        PaymentEventKind::PaymentSucceeded(pi) => on_payment_succeeded(store, event, pi).await,
        PaymentEventKind::PaymentFailed(pi) => on_payment_failed(store, event, pi).await,
        PaymentEventKind::ChargeRefunded(charge) => on_charge_refunded(store, event, charge).await,
        PaymentEventKind::Malformed(reason) => {
            tracing::warn!(%reason, "known event type with unreadable object");
            Ok(ReconcileOutcome::Skipped {
                order_id: None,
                reason: SkipReason::Malformed(reason.clone()),
            })
        }
        PaymentEventKind::Other => {
            tracing::info!("unhandled event type");
            Ok(ReconcileOutcome::Unhandled)
        }
    }
}

fn skipped(order_id: Option<OrderId>, reason: SkipReason) -> ReconcileOutcome {
    tracing::warn!(order_id = ?order_id, reason = ?reason, "event skipped");
    ReconcileOutcome::Skipped { order_id, reason }
}

/// Looks the order up by the id stamped into intent metadata at creation.
async fn order_from_metadata(
    store: &dyn Datastore,
    metadata: &IntentMetadata,
) -> Result<Result<Order, SkipReason>, MarketError> {
    let Some(order_id) = metadata
        .order_id
        .as_deref()
        .and_then(|raw| raw.parse::<OrderId>().ok())
    else {
        return Ok(Err(SkipReason::MissingOrderReference));
    };

    Ok(store
        .find_order(order_id)
        .await?
        .ok_or(SkipReason::OrderNotFound))
}

async fn current_status(store: &dyn Datastore, order: &Order) -> Result<OrderStatus, MarketError> {
    Ok(store
        .find_order(order.id)
        .await?
        .map_or(order.status, |o| o.status))
}

fn intent_mismatch(order: &Order, intent_id: &str) -> Option<SkipReason> {
    (order.payment_intent_id.as_str() != intent_id).then(|| SkipReason::IntentMismatch {
        stored: order.payment_intent_id.to_string(),
        received: intent_id.to_string(),
    })
}

async fn on_payment_succeeded(
    store: &dyn Datastore,
    event: &VerifiedEvent,
    pi: &IntentSnapshot,
) -> Result<ReconcileOutcome, MarketError> {
    let order = match order_from_metadata(store, &pi.metadata).await? {
        Ok(order) => order,
        Err(reason) => return Ok(skipped(None, reason)),
    };

    if order.status == OrderStatus::Paid {
        tracing::info!(order_id = %order.id, "order already paid");
        return Ok(ReconcileOutcome::AlreadyPaid(order.id));
    }

    if let Some(reason) = intent_mismatch(&order, &pi.intent_id) {
        return Ok(skipped(Some(order.id), reason));
    }

    let stored_currency = order.money.currency().as_str();
    if pi.currency != stored_currency {
        return Ok(skipped(
            Some(order.id),
            SkipReason::CurrencyMismatch {
                stored: stored_currency.to_string(),
                received: pi.currency.clone(),
            },
        ));
    }

    if order.status != OrderStatus::Pending {
        return Ok(skipped(Some(order.id), SkipReason::NotPending(order.status)));
    }

    let expected = order.money.amount().minor_units();
    let received = pi.amount_received;
    if received != expected {
        // Logged, not blocking: the intent id match is the binding.
        tracing::warn!(order_id = %order.id, expected, received, "payment amount mismatch");
        let entry = order
            .audit_entry(ACTOR_WEBHOOK, "payment_amount_mismatch")
            .event(event.id.as_str())
            .before(json!({ "expected": expected }))
            .after(json!({ "received": received, "currency": pi.currency }));
        store.record(&entry).await?;
    }

    let entry = order
        .audit_entry(ACTOR_WEBHOOK, "payment_completed")
        .event(event.id.as_str())
        .before(json!({ "status": order.status.as_str() }))
        .after(json!({
            "status": OrderStatus::Paid.as_str(),
            "payment_intent": pi.intent_id,
            "charge_id": pi.latest_charge,
            "amount_received": received,
        }));

    match store
        .apply_payment_success(order.id, pi.latest_charge.as_deref(), &entry)
        .await?
    {
        Some((paid, grant)) => {
            tracing::info!(
                order_id = %paid.id,
                buyer_id = %grant.buyer_id,
                listing_id = %grant.listing_id,
                "order paid, access granted"
            );
            Ok(ReconcileOutcome::Paid(paid.id))
        }
        // Another delivery moved the order between our read and the update.
        None => match current_status(store, &order).await? {
            OrderStatus::Paid => Ok(ReconcileOutcome::AlreadyPaid(order.id)),
            status => Ok(skipped(Some(order.id), SkipReason::NotPending(status))),
        },
    }
}

async fn on_payment_failed(
    store: &dyn Datastore,
    event: &VerifiedEvent,
    pi: &IntentSnapshot,
) -> Result<ReconcileOutcome, MarketError> {
    let order = match order_from_metadata(store, &pi.metadata).await? {
        Ok(order) => order,
        Err(reason) => return Ok(skipped(None, reason)),
    };

    if let Some(reason) = intent_mismatch(&order, &pi.intent_id) {
        return Ok(skipped(Some(order.id), reason));
    }

    if order.status != OrderStatus::Pending {
        // Never downgrades a paid order.
        tracing::info!(order_id = %order.id, status = %order.status, "failure for non-pending order ignored");
        return Ok(ReconcileOutcome::Skipped {
            order_id: Some(order.id),
            reason: SkipReason::NotPending(order.status),
        });
    }

    let entry = order
        .audit_entry(ACTOR_WEBHOOK, "payment_failed")
        .event(event.id.as_str())
        .before(json!({ "status": order.status.as_str() }))
        .after(json!({
            "status": OrderStatus::Failed.as_str(),
            "payment_intent": pi.intent_id,
            "failure_message": pi.failure_message,
        }));

    let updated = update_order_status(
        store,
        order.id,
        OrderStatus::Pending,
        OrderStatus::Failed,
        &StatusPatch::failure(pi.failure_message.clone()),
        Some(&entry),
    )
    .await?;

    match updated {
        Some(failed) => {
            tracing::info!(order_id = %failed.id, "order marked failed");
            Ok(ReconcileOutcome::MarkedFailed(failed.id))
        }
        None => {
            let status = current_status(store, &order).await?;
            Ok(ReconcileOutcome::Skipped {
                order_id: Some(order.id),
                reason: SkipReason::NotPending(status),
            })
        }
    }
}

async fn on_charge_refunded(
    store: &dyn Datastore,
    event: &VerifiedEvent,
    charge: &ChargeSnapshot,
) -> Result<ReconcileOutcome, MarketError> {
    let Some(intent_id) = charge.payment_intent.as_deref() else {
        return Ok(skipped(None, SkipReason::MissingOrderReference));
    };

    let Some(order) = store.find_order_by_intent(intent_id).await? else {
        return Ok(skipped(None, SkipReason::OrderNotFound));
    };

    if order.status != OrderStatus::Paid {
        tracing::info!(order_id = %order.id, status = %order.status, "refund for non-paid order ignored");
        return Ok(ReconcileOutcome::Skipped {
            order_id: Some(order.id),
            reason: SkipReason::NotPaid(order.status),
        });
    }

    let entry = order
        .audit_entry(ACTOR_WEBHOOK, "payment_refunded")
        .event(event.id.as_str())
        .before(json!({ "status": order.status.as_str() }))
        .after(json!({
            "status": OrderStatus::Refunded.as_str(),
            "charge_id": charge.charge_id,
            "amount_refunded": charge.amount_refunded,
        }));

    match store.apply_refund(order.id, &entry).await? {
        Some(refunded) => {
            tracing::info!(order_id = %refunded.id, "order refunded, access revoked");
            Ok(ReconcileOutcome::Refunded(refunded.id))
        }
        None => {
            let status = current_status(store, &order).await?;
            Ok(ReconcileOutcome::Skipped {
                order_id: Some(order.id),
                reason: SkipReason::NotPaid(status),
            })
        }
    }
}
