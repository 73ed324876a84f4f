use {
    crate::domain::{
        deliverable::{Deliverable, DownloadAudit},
        error::MarketError,
        id::{DeliverableId, OrderId},
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct DeliverableRow {
    id: Uuid,
    order_id: Uuid,
    storage_path: String,
    delivered_at: Option<DateTime<Utc>>,
}

pub async fn find_deliverable(pool: &PgPool, id: DeliverableId) -> Result<Option<Deliverable>, MarketError> {
    let row = sqlx::query_as::<_, DeliverableRow>(
        "SELECT id, order_id, storage_path, delivered_at FROM deliverables WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Deliverable {
        id: DeliverableId::from_uuid(r.id),
        order_id: OrderId::from_uuid(r.order_id),
        storage_path: r.storage_path,
        delivered_at: r.delivered_at,
    }))
}

pub async fn record_download(pool: &PgPool, audit: &DownloadAudit) -> Result<(), MarketError> {
    sqlx::query(
        "INSERT INTO downloads (order_id, deliverable_id, ip_address, user_agent) VALUES ($1, $2, $3, $4)",
    )
    .bind(audit.order_id.as_uuid())
    .bind(audit.deliverable_id.as_uuid())
    .bind(audit.ip.as_deref())
    .bind(audit.user_agent.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}
