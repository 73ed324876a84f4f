use {
    crate::{
        AppState,
        domain::{
            deliverable::{DownloadAudit, file_name, normalize_storage_path},
            error::{DenyReason, MarketError},
            id::{DeliverableId, OrderId},
            principal::{Principal, RequestContext},
        },
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDownload {
    pub download_url: String,
    pub file_name: String,
    pub expires_in_secs: u64,
}

fn deny(deliverable_id: DeliverableId, reason: DenyReason) -> MarketError {
    tracing::warn!(%deliverable_id, %reason, "download denied");
    MarketError::AccessDenied(reason)
}

/// Re-checks ownership, listing state and the purchase grant on every
/// request before minting a short-lived URL. The grant is the authority;
/// a `paid` order alone opens nothing.
#[tracing::instrument(skip_all, fields(deliverable_id = %deliverable_id))]
pub async fn resolve_download(
    state: &AppState,
    requester: Option<&Principal>,
    deliverable_id: DeliverableId,
    claimed_order_id: Option<OrderId>,
    ctx: &RequestContext,
) -> Result<SignedDownload, MarketError> {
    let requester = requester.ok_or(MarketError::Authentication)?;
    let store = &state.store;

    let deliverable = store
        .find_deliverable(deliverable_id)
        .await?
        .ok_or(MarketError::NotFound("deliverable"))?;

    if claimed_order_id.is_some_and(|claimed| claimed != deliverable.order_id) {
        return Err(deny(deliverable_id, DenyReason::OrderMismatch));
    }

    let order = store
        .find_order(deliverable.order_id)
        .await?
        .ok_or(MarketError::NotFound("order"))?;

    if order.buyer_id != requester.id {
        return Err(deny(deliverable_id, DenyReason::NotBuyer));
    }

    let listing = store.find_listing(order.listing_id).await?;
    if listing.as_ref().is_some_and(|l| l.is_archived()) {
        return Err(deny(deliverable_id, DenyReason::ListingArchived));
    }
    let seller_id = listing.map_or(order.seller_id, |l| l.seller_id);
    if seller_id == requester.id {
        return Err(deny(deliverable_id, DenyReason::SellerOwnListing));
    }

    let granted = store
        .find_grant(requester.id, order.listing_id)
        .await?
        .is_some_and(|g| g.is_bound_to(order.id));
    if !granted {
        return Err(deny(deliverable_id, DenyReason::NoGrant));
    }

    let object_path = normalize_storage_path(&deliverable.storage_path, state.blobs.bucket())
        .ok_or_else(|| {
            tracing::error!(%deliverable_id, "deliverable storage path is not in the bucket");
            MarketError::Store(format!("invalid storage path for deliverable {deliverable_id}"))
        })?;

    let ttl = state.settings.signed_url_ttl;
    let download_url = state
        .blobs
        .issue_temporary_download_url(&object_path, ttl)
        .await
        .map_err(|e| {
            tracing::error!(%deliverable_id, error = %e, "failed to sign download url");
            e
        })?;

    store
        .record_download(&DownloadAudit {
            order_id: order.id,
            deliverable_id: deliverable.id,
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
        })
        .await?;

    tracing::info!(order_id = %order.id, "download url issued");
    Ok(SignedDownload {
        file_name: file_name(&object_path).to_string(),
        download_url,
        expires_in_secs: ttl.as_secs(),
    })
}
