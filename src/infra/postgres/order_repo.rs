use {
    super::{audit_repo::insert_audit_entry, grant_repo},
    crate::domain::{
        audit::NewAuditEntry,
        error::{MarketError, PurchaseRejection},
        grant::PurchaseGrant,
        id::{IntentRef, ListingId, OrderId, UserId},
        money::{Currency, Money, MoneyAmount},
        order::{NewOrder, Order, OrderStatus, StatusPatch},
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

/// Partial unique index carrying the one-in-flight-order rule.
pub const IN_FLIGHT_INDEX: &str = "orders_one_in_flight_per_buyer";

macro_rules! order_columns {
    () => {
        "id, listing_id, buyer_id, seller_id, amount_minor, currency, payment_intent_id, \
         status, charge_id, failure_reason, created_at, updated_at, paid_at, refunded_at"
    };
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    listing_id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    amount_minor: i64,
    currency: String,
    payment_intent_id: String,
    status: String,
    charge_id: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = MarketError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::from_uuid(row.id),
            listing_id: ListingId::from_uuid(row.listing_id),
            buyer_id: UserId::from_uuid(row.buyer_id),
            seller_id: UserId::from_uuid(row.seller_id),
            money: Money::new(
                MoneyAmount::new(row.amount_minor)?,
                Currency::try_from(row.currency.as_str())?,
            ),
            payment_intent_id: IntentRef::new(row.payment_intent_id)?,
            status: OrderStatus::try_from(row.status.as_str())?,
            charge_id: row.charge_id,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
            refunded_at: row.refunded_at,
        })
    }
}

fn violates(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.is_unique_violation() && db.constraint() == Some(constraint)
    )
}

pub async fn find_order(pool: &PgPool, id: OrderId) -> Result<Option<Order>, MarketError> {
    sqlx::query_as::<_, OrderRow>(concat!("SELECT ", order_columns!(), " FROM orders WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(pool)
        .await?
        .map(Order::try_from)
        .transpose()
}

pub async fn find_order_by_intent(pool: &PgPool, intent_id: &str) -> Result<Option<Order>, MarketError> {
    sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM orders WHERE payment_intent_id = $1"
    ))
    .bind(intent_id)
    .fetch_optional(pool)
    .await?
    .map(Order::try_from)
    .transpose()
}

pub async fn find_in_flight_order(
    pool: &PgPool,
    buyer_id: UserId,
    listing_id: ListingId,
) -> Result<Option<Order>, MarketError> {
    sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM orders WHERE buyer_id = $1 AND listing_id = $2 AND status IN ('pending', 'paid') LIMIT 1"
    ))
    .bind(buyer_id.as_uuid())
    .bind(listing_id.as_uuid())
    .fetch_optional(pool)
    .await?
    .map(Order::try_from)
    .transpose()
}

pub async fn insert_order(pool: &PgPool, new: &NewOrder) -> Result<Order, MarketError> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(
        r#"
        INSERT INTO orders
            (id, listing_id, buyer_id, seller_id, amount_minor, currency, payment_intent_id, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
        RETURNING "#,
        order_columns!()
    ))
    .bind(new.id.as_uuid())
    .bind(new.listing_id.as_uuid())
    .bind(new.buyer_id.as_uuid())
    .bind(new.seller_id.as_uuid())
    .bind(new.money.amount().minor_units())
    .bind(new.money.currency().code())
    .bind(new.payment_intent_id.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if violates(&e, IN_FLIGHT_INDEX) {
            MarketError::Purchase(PurchaseRejection::OrderInProgress)
        } else {
            e.into()
        }
    })?;

    row.try_into()
}

pub async fn attach_intent(
    pool: &PgPool,
    id: OrderId,
    placeholder: &IntentRef,
    intent_id: &IntentRef,
) -> Result<bool, MarketError> {
    let result = sqlx::query(
        "UPDATE orders SET payment_intent_id = $3, updated_at = now() WHERE id = $1 AND payment_intent_id = $2",
    )
    .bind(id.as_uuid())
    .bind(placeholder.as_str())
    .bind(intent_id.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_order(pool: &PgPool, id: OrderId) -> Result<(), MarketError> {
    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(())
}

/// Compare-and-swap on `status`. Zero rows matched means another event got
/// there first; the caller sees `None`.
pub async fn transition_status(
    pool: &PgPool,
    id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    patch: &StatusPatch,
    audit: Option<&NewAuditEntry>,
) -> Result<Option<Order>, MarketError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, OrderRow>(concat!(
        r#"
        UPDATE orders
        SET status = $3,
            updated_at = now(),
            charge_id = COALESCE($4, charge_id),
            failure_reason = COALESCE($5, failure_reason),
            paid_at = CASE WHEN $3 = 'paid' THEN now() ELSE paid_at END,
            refunded_at = CASE WHEN $3 = 'refunded' THEN now() ELSE refunded_at END
        WHERE id = $1 AND status = $2
        RETURNING "#,
        order_columns!()
    ))
    .bind(id.as_uuid())
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(patch.charge_id.as_deref())
    .bind(patch.failure_reason.as_deref())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    if let Some(entry) = audit {
        insert_audit_entry(&mut *tx, entry).await?;
    }
    tx.commit().await?;

    Ok(Some(row.try_into()?))
}

pub async fn apply_payment_success(
    pool: &PgPool,
    id: OrderId,
    charge_id: Option<&str>,
    audit: &NewAuditEntry,
) -> Result<Option<(Order, PurchaseGrant)>, MarketError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, OrderRow>(concat!(
        r#"
        UPDATE orders
        SET status = 'paid', charge_id = $2, paid_at = now(), updated_at = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING "#,
        order_columns!()
    ))
    .bind(id.as_uuid())
    .bind(charge_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };
    let order = Order::try_from(row)?;

    let grant = grant_repo::upsert_grant(&mut *tx, order.buyer_id, order.listing_id, order.id).await?;
    insert_audit_entry(&mut *tx, audit).await?;
    tx.commit().await?;

    Ok(Some((order, grant)))
}

pub async fn apply_refund(
    pool: &PgPool,
    id: OrderId,
    audit: &NewAuditEntry,
) -> Result<Option<Order>, MarketError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, OrderRow>(concat!(
        r#"
        UPDATE orders
        SET status = 'refunded', refunded_at = now(), updated_at = now()
        WHERE id = $1 AND status = 'paid'
        RETURNING "#,
        order_columns!()
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };
    let order = Order::try_from(row)?;

    grant_repo::delete_grant(&mut *tx, order.buyer_id, order.listing_id).await?;
    insert_audit_entry(&mut *tx, audit).await?;
    tx.commit().await?;

    Ok(Some(order))
}
