use {
    crate::domain::{
        error::MarketError,
        id::{ListingId, UserId},
        listing::{Listing, ListingStatus},
        money::Currency,
    },
    rust_decimal::Decimal,
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    seller_id: Uuid,
    title: String,
    price: Decimal,
    currency: Option<String>,
    status: String,
}

impl TryFrom<ListingRow> for Listing {
    type Error = MarketError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ListingId::from_uuid(row.id),
            seller_id: UserId::from_uuid(row.seller_id),
            title: row.title,
            price: row.price,
            currency: match row.currency.as_deref() {
                Some(code) if !code.trim().is_empty() => Currency::try_from(code)?,
                _ => Currency::Usd,
            },
            status: ListingStatus::try_from(row.status.as_str())?,
        })
    }
}

pub async fn find_listing(pool: &PgPool, id: ListingId) -> Result<Option<Listing>, MarketError> {
    sqlx::query_as::<_, ListingRow>(
        "SELECT id, seller_id, title, price, currency, status FROM listings WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?
    .map(Listing::try_from)
    .transpose()
}
