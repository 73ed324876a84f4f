use {
    super::{order_ledger, payment_bridge},
    crate::{
        AppState,
        domain::{
            audit::user_actor,
            error::MarketError,
            id::{ListingId, OrderId},
            money::Currency,
            principal::{Principal, RequestContext},
        },
    },
    rust_decimal::Decimal,
    serde_json::json,
};

/// What the buyer's client needs to confirm payment. The client secret is
/// the only processor artifact that leaves the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub order_id: OrderId,
    pub listing_id: ListingId,
    pub amount: Decimal,
    pub currency: Currency,
    pub client_secret: String,
}

pub async fn start_checkout(
    state: &AppState,
    principal: Option<&Principal>,
    listing_id: ListingId,
    ctx: &RequestContext,
) -> Result<CheckoutSession, MarketError> {
    let created = order_ledger::create_order(state, principal, listing_id, ctx).await?;
    let order = created.order;
    let intent = payment_bridge::create_intent(state, &order, &created.listing).await?;

    let entry = order
        .audit_entry(&user_actor(order.buyer_id), "create_order")
        .after(json!({
            "status": order.status.as_str(),
            "listing_id": order.listing_id,
            "amount_minor": order.money.amount().minor_units(),
            "currency": order.money.currency().code(),
            "payment_intent_id": intent.intent_id.as_str(),
        }))
        .request(ctx);
    // Order and intent are committed at this point; the request succeeds.
    if let Err(e) = state.store.record(&entry).await {
        tracing::error!(order_id = %order.id, error = %e, "create_order audit write failed");
    }

    Ok(CheckoutSession {
        order_id: order.id,
        listing_id: order.listing_id,
        amount: order.money.to_major(),
        currency: order.money.currency(),
        client_secret: intent.client_secret,
    })
}
