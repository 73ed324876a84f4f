use {
    super::audit::NewAuditEntry,
    super::error::MarketError,
    super::id::{IntentRef, ListingId, OrderId, UserId},
    super::listing::Listing,
    super::money::Money,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Statuses that block another order for the same buyer and listing.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }

    /// pending -> paid | failed, paid -> refunded. Nothing else.
    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed) | (Self::Paid, Self::Refunded)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = MarketError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(MarketError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Full order record as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub money: Money,
    pub payment_intent_id: IntentRef,
    pub charge_id: Option<String>,
    pub status: OrderStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn audit_entry(&self, actor: &str, action: &str) -> NewAuditEntry {
        NewAuditEntry::new(actor, action, "orders").resource(self.id.as_uuid())
    }
}

/// For INSERT; the id is generated in Rust via `Uuid::now_v7()`.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub money: Money,
    pub payment_intent_id: IntentRef,
}

impl NewOrder {
    /// Captures the listing's price at this instant; the amount never
    /// changes afterwards.
    pub fn for_listing(buyer_id: UserId, listing: &Listing) -> Result<Self, MarketError> {
        Ok(Self {
            id: OrderId::new(),
            listing_id: listing.id,
            buyer_id,
            seller_id: listing.seller_id,
            money: Money::from_major(listing.price, listing.currency)?,
            payment_intent_id: IntentRef::placeholder(),
        })
    }
}

/// Extra columns written alongside a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub charge_id: Option<String>,
    pub failure_reason: Option<String>,
}

impl StatusPatch {
    pub fn failure(reason: Option<String>) -> Self {
        Self {
            charge_id: None,
            failure_reason: reason,
        }
    }
}
