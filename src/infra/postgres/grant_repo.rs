use {
    crate::domain::{
        error::MarketError,
        grant::PurchaseGrant,
        id::{ListingId, OrderId, UserId},
    },
    chrono::{DateTime, Utc},
    sqlx::PgExecutor,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    buyer_id: Uuid,
    listing_id: Uuid,
    order_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<PurchaseRow> for PurchaseGrant {
    fn from(row: PurchaseRow) -> Self {
        Self {
            buyer_id: UserId::from_uuid(row.buyer_id),
            listing_id: ListingId::from_uuid(row.listing_id),
            order_id: OrderId::from_uuid(row.order_id),
            created_at: row.created_at,
        }
    }
}

pub async fn find_grant<'e, E>(
    executor: E,
    buyer_id: UserId,
    listing_id: ListingId,
) -> Result<Option<PurchaseGrant>, MarketError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PurchaseRow>(
        "SELECT buyer_id, listing_id, order_id, created_at FROM purchases WHERE buyer_id = $1 AND listing_id = $2",
    )
    .bind(buyer_id.as_uuid())
    .bind(listing_id.as_uuid())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(PurchaseGrant::from))
}

/// Replays land on the (buyer, listing) key and only repoint `order_id`.
pub async fn upsert_grant<'e, E>(
    executor: E,
    buyer_id: UserId,
    listing_id: ListingId,
    order_id: OrderId,
) -> Result<PurchaseGrant, MarketError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, PurchaseRow>(
        r#"
        INSERT INTO purchases (buyer_id, listing_id, order_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (buyer_id, listing_id) DO UPDATE SET order_id = EXCLUDED.order_id
        RETURNING buyer_id, listing_id, order_id, created_at
        "#,
    )
    .bind(buyer_id.as_uuid())
    .bind(listing_id.as_uuid())
    .bind(order_id.as_uuid())
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}

pub async fn delete_grant<'e, E>(
    executor: E,
    buyer_id: UserId,
    listing_id: ListingId,
) -> Result<bool, MarketError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM purchases WHERE buyer_id = $1 AND listing_id = $2")
        .bind(buyer_id.as_uuid())
        .bind(listing_id.as_uuid())
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}
