use {
    super::error::MarketError,
    super::id::{ListingId, UserId},
    super::money::Currency,
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    PendingReview,
    Published,
    Rejected,
    Archived,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending_review",
            Self::Published => "published",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ListingStatus {
    type Error = MarketError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "draft" => Ok(Self::Draft),
            "pending_review" => Ok(Self::PendingReview),
            "published" => Ok(Self::Published),
            "rejected" => Ok(Self::Rejected),
            "archived" => Ok(Self::Archived),
            other => Err(MarketError::Validation(format!(
                "unknown listing status: {other}"
            ))),
        }
    }
}

/// A sellable project listing. Its price is only read at order creation;
/// later changes never touch existing orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub title: String,
    pub price: Decimal,
    pub currency: Currency,
    pub status: ListingStatus,
}

impl Listing {
    pub fn is_purchasable(&self) -> bool {
        self.status == ListingStatus::Published
    }

    pub fn is_archived(&self) -> bool {
        self.status == ListingStatus::Archived
    }
}
