use {
    crate::{
        AppState,
        domain::{
            audit::{NewAuditEntry, user_actor},
            error::{MarketError, PurchaseRejection},
            id::{ListingId, OrderId},
            listing::Listing,
            order::{NewOrder, Order, OrderStatus, StatusPatch},
            principal::{Principal, RequestContext},
            store::Datastore,
        },
    },
    chrono::Utc,
    rust_decimal::Decimal,
    serde_json::json,
};

/// A freshly inserted `pending` order and the listing it was priced from.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub listing: Listing,
}

/// Validates a purchase request and inserts a `pending` order carrying a
/// placeholder intent id.
///
/// The pre-checks for an existing grant or in-flight order only save a
/// round trip. Two racing requests are settled by the datastore's
/// one-in-flight-order constraint and the loser gets
/// `PurchaseRejection::OrderInProgress`.
#[tracing::instrument(skip_all, fields(listing_id = %listing_id))]
pub async fn create_order(
    state: &AppState,
    principal: Option<&Principal>,
    listing_id: ListingId,
    ctx: &RequestContext,
) -> Result<CreatedOrder, MarketError> {
    let buyer = principal.ok_or(MarketError::Authentication)?;

    enforce_rate_limit(state, buyer, listing_id, ctx).await?;

    if !buyer.email_verified {
        return Err(MarketError::Purchase(PurchaseRejection::EmailNotVerified));
    }

    let listing = state
        .store
        .find_listing(listing_id)
        .await?
        .filter(Listing::is_purchasable)
        .ok_or(MarketError::Purchase(PurchaseRejection::ListingUnavailable))?;

    if listing.seller_id == buyer.id {
        return Err(MarketError::Purchase(PurchaseRejection::SelfPurchase));
    }

    if state.store.find_grant(buyer.id, listing.id).await?.is_some() {
        return Err(MarketError::Purchase(PurchaseRejection::AlreadyPurchased));
    }

    if let Some(existing) = state.store.find_in_flight_order(buyer.id, listing.id).await? {
        tracing::info!(order_id = %existing.id, status = %existing.status, "order already in flight");
        return Err(MarketError::Purchase(PurchaseRejection::OrderInProgress));
    }

    if listing.price <= Decimal::ZERO {
        return Err(MarketError::Purchase(PurchaseRejection::InvalidPrice));
    }
    let new_order = NewOrder::for_listing(buyer.id, &listing)
        .map_err(|_| MarketError::Purchase(PurchaseRejection::InvalidPrice))?;
    // Sub-cent prices round to nothing.
    if new_order.money.amount().is_zero() {
        return Err(MarketError::Purchase(PurchaseRejection::InvalidPrice));
    }

    let order = state.store.insert_order(&new_order).await?;
    tracing::info!(order_id = %order.id, amount = %order.money, "order created");

    Ok(CreatedOrder { order, listing })
}

/// Per-user and per-IP fixed windows. A denial is audited before the
/// caller sees the 429.
async fn enforce_rate_limit(
    state: &AppState,
    buyer: &Principal,
    listing_id: ListingId,
    ctx: &RequestContext,
) -> Result<(), MarketError> {
    let settings = &state.settings;
    let keys = [
        format!("order:user:{}", buyer.id),
        format!("order:ip:{}", ctx.ip_or_unknown()),
    ];

    for key in keys {
        let decision = state
            .rate_limiter
            .check(&key, settings.order_rate_limit, settings.order_rate_window)
            .await;
        if decision.allowed {
            continue;
        }

        let retry_after_secs = decision.retry_after_secs(Utc::now());
        tracing::warn!(%key, retry_after_secs, "order creation rate limited");

        let entry = NewAuditEntry::new(&user_actor(buyer.id), "create_order_rate_limited", "orders")
            .after(json!({
                "listing_id": listing_id,
                "key": key,
                "limit": decision.limit,
                "reset_at": decision.reset_at,
            }))
            .request(ctx);
        state.store.record(&entry).await?;

        return Err(MarketError::RateLimited { retry_after_secs });
    }
    Ok(())
}

/// Conditional status change. Only legal transitions are accepted, and a
/// transition from a status the order is no longer in is a silent no-op
/// (`Ok(None)`), because some other event already moved it.
pub async fn update_order_status(
    store: &dyn Datastore,
    order_id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    patch: &StatusPatch,
    audit: Option<&NewAuditEntry>,
) -> Result<Option<Order>, MarketError> {
    if !from.can_transition_to(&to) {
        return Err(MarketError::Validation(format!(
            "illegal order transition {from} -> {to}"
        )));
    }

    let updated = store.transition_status(order_id, from, to, patch, audit).await?;
    if updated.is_none() {
        tracing::debug!(%order_id, %from, %to, "status precondition not met, no-op");
    }
    Ok(updated)
}
