//! Drift scans. Read-only; nothing here repairs what it finds.

use {
    crate::domain::{
        error::MarketError,
        id::{DeliverableId, EventId, OrderId},
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

pub async fn paid_orders_missing_grants(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<OrderId>, MarketError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT o.id
        FROM orders o
        LEFT JOIN purchases p
            ON p.buyer_id = o.buyer_id AND p.listing_id = o.listing_id AND p.order_id = o.id
        WHERE o.status = 'paid' AND o.created_at >= $1 AND p.order_id IS NULL
        ORDER BY o.created_at
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(OrderId::from_uuid).collect())
}

/// Grants whose order is missing or not `paid`.
pub async fn grants_without_paid_order(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<OrderId>, MarketError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT p.order_id
        FROM purchases p
        LEFT JOIN orders o ON o.id = p.order_id
        WHERE p.created_at >= $1 AND (o.id IS NULL OR o.status <> 'paid')
        ORDER BY p.order_id
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(OrderId::from_uuid).collect())
}

pub async fn deliverables_without_paid_order(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<DeliverableId>, MarketError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT d.id
        FROM deliverables d
        LEFT JOIN orders o ON o.id = d.order_id
        WHERE d.delivered_at >= $1 AND (o.id IS NULL OR o.status <> 'paid')
        ORDER BY d.id
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(DeliverableId::from_uuid).collect())
}

pub async fn stale_received_events(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<EventId>, MarketError> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT event_id
        FROM payment_events
        WHERE status = 'received' AND received_at < $1
        ORDER BY received_at
        LIMIT $2
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    ids.into_iter().map(EventId::new).collect()
}
