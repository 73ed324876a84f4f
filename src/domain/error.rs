use {derive_more::Display, thiserror::Error};

/// Why a purchase request was refused before any order row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PurchaseRejection {
    #[display("email not verified")]
    EmailNotVerified,
    #[display("listing unavailable")]
    ListingUnavailable,
    #[display("self purchase")]
    SelfPurchase,
    #[display("already purchased")]
    AlreadyPurchased,
    #[display("order in progress")]
    OrderInProgress,
    #[display("invalid price")]
    InvalidPrice,
}

impl PurchaseRejection {
    /// Short message safe to show the buyer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmailNotVerified => "verify your email first",
            Self::ListingUnavailable => "listing not found or unavailable",
            Self::SelfPurchase => "you cannot buy your own listing",
            Self::AlreadyPurchased => "already purchased",
            Self::OrderInProgress => "an order is already in progress for this listing",
            Self::InvalidPrice => "this listing cannot be purchased",
        }
    }
}

/// Download check that failed. Never surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DenyReason {
    #[display("order mismatch")]
    OrderMismatch,
    #[display("not the buyer")]
    NotBuyer,
    #[display("listing archived")]
    ListingArchived,
    #[display("seller of listing")]
    SellerOwnListing,
    #[display("no purchase grant")]
    NoGrant,
}

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("authentication required")]
    Authentication,

    #[error("purchase rejected: {0}")]
    Purchase(PurchaseRejection),

    #[error("access denied: {0}")]
    AccessDenied(DenyReason),

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("external service: {0}")]
    ExternalService(String),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(String),
}
