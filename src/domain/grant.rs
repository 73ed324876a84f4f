use {
    super::id::{ListingId, OrderId, UserId},
    chrono::{DateTime, Utc},
};

/// Download entitlement for one buyer on one listing. Its existence is the
/// only thing that opens the download gate; a paid order without a grant
/// is not yet confirmed access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseGrant {
    pub buyer_id: UserId,
    pub listing_id: ListingId,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
}

impl PurchaseGrant {
    pub fn is_bound_to(&self, order_id: OrderId) -> bool {
        self.order_id == order_id
    }
}
