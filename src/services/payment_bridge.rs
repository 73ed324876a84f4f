use {
    crate::{
        AppState,
        domain::{
            error::MarketError,
            listing::Listing,
            order::Order,
            provider::{CreatedIntent, IntentRequest},
        },
    },
};

pub fn idempotency_key(order: &Order) -> String {
    format!("order-{}", order.id)
}

pub fn intent_request(order: &Order, listing: &Listing, statement_prefix: &str) -> IntentRequest {
    IntentRequest {
        order_id: order.id,
        listing_id: order.listing_id,
        buyer_id: order.buyer_id,
        money: order.money,
        description: format!("{statement_prefix}: {}", listing.title),
        idempotency_key: idempotency_key(order),
    }
}

/// Opens the processor intent for a freshly created order and writes its id
/// back onto the order.
///
/// An order never outlives a failed intent: if creation fails the order is
/// deleted; if the write-back fails the intent is cancelled and then the
/// order is deleted.
#[tracing::instrument(skip_all, fields(order_id = %order.id))]
pub async fn create_intent(
    state: &AppState,
    order: &Order,
    listing: &Listing,
) -> Result<CreatedIntent, MarketError> {
    let request = intent_request(order, listing, &state.settings.statement_prefix);

    let created = match state.gateway.create_intent(&request).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(
                idempotency_key = %request.idempotency_key,
                error = %e,
                "payment intent creation failed, rolling back order"
            );
            discard_order(state, order).await;
            return Err(e);
        }
    };

    let attached = state
        .store
        .attach_intent(order.id, &order.payment_intent_id, &created.intent_id)
        .await;

    match attached {
        Ok(true) => {
            tracing::info!(intent_id = %created.intent_id, "payment intent attached");
            Ok(created)
        }
        Ok(false) => {
            tracing::error!(intent_id = %created.intent_id, "order changed before intent write-back");
            compensate(state, order, &created).await;
            Err(MarketError::Store(format!(
                "order {} no longer carries its placeholder intent",
                order.id
            )))
        }
        Err(e) => {
            tracing::error!(intent_id = %created.intent_id, error = %e, "intent write-back failed");
            compensate(state, order, &created).await;
            Err(e)
        }
    }
}

async fn compensate(state: &AppState, order: &Order, created: &CreatedIntent) {
    if let Err(e) = state.gateway.cancel_intent(&created.intent_id).await {
        tracing::error!(intent_id = %created.intent_id, error = %e, "failed to cancel orphaned intent");
    }
    discard_order(state, order).await;
}

async fn discard_order(state: &AppState, order: &Order) {
    if let Err(e) = state.store.delete_order(order.id).await {
        tracing::error!(order_id = %order.id, error = %e, "failed to delete rolled-back order");
    }
}
