use {
    crate::domain::{
        error::MarketError,
        id::EventId,
        payment_event::{EventClaim, EventStatus, NewPaymentEvent, PaymentEventRecord},
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
};

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    event_type: String,
    status: String,
    error: Option<String>,
    payload: serde_json::Value,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for PaymentEventRecord {
    type Error = MarketError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: EventId::new(row.event_id)?,
            event_type: row.event_type,
            status: EventStatus::try_from(row.status.as_str())?,
            error: row.error,
            payload: row.payload,
            received_at: row.received_at,
            processed_at: row.processed_at,
        })
    }
}

/// Inserts the event as `received`. A row left `failed` by an earlier
/// delivery is reclaimed so the processor's retry gets a real second try;
/// `received` and `processed` rows are left alone.
pub async fn claim_event(pool: &PgPool, event: &NewPaymentEvent) -> Result<EventClaim, MarketError> {
    let claimed = sqlx::query_scalar::<_, String>(
        r#"
        INSERT INTO payment_events (event_id, event_type, status, payload)
        VALUES ($1, $2, 'received', $3)
        ON CONFLICT (event_id) DO UPDATE
            SET status = 'received', error = NULL, received_at = now(), processed_at = NULL
            WHERE payment_events.status = 'failed'
        RETURNING event_id
        "#,
    )
    .bind(event.event_id.as_str())
    .bind(&event.event_type)
    .bind(&event.payload)
    .fetch_optional(pool)
    .await?;

    Ok(match claimed {
        Some(_) => EventClaim::Claimed,
        None => EventClaim::AlreadyHandled,
    })
}

pub async fn mark_processed(pool: &PgPool, event_id: &EventId) -> Result<(), MarketError> {
    sqlx::query(
        "UPDATE payment_events SET status = 'processed', error = NULL, processed_at = now() WHERE event_id = $1",
    )
    .bind(event_id.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, event_id: &EventId, error: &str) -> Result<(), MarketError> {
    sqlx::query(
        "UPDATE payment_events SET status = 'failed', error = $2, processed_at = now() WHERE event_id = $1",
    )
    .bind(event_id.as_str())
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_event(pool: &PgPool, event_id: &EventId) -> Result<Option<PaymentEventRecord>, MarketError> {
    sqlx::query_as::<_, EventRow>(
        r#"
        SELECT event_id, event_type, status, error, payload, received_at, processed_at
        FROM payment_events
        WHERE event_id = $1
        "#,
    )
    .bind(event_id.as_str())
    .fetch_optional(pool)
    .await?
    .map(PaymentEventRecord::try_from)
    .transpose()
}
