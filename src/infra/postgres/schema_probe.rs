//! Startup guard for the `orders` schema version. The service runs against
//! exactly one schema; a database that has not been migrated that far is
//! refused before the listener binds, instead of half-working at runtime.

use {crate::domain::error::MarketError, sqlx::PgPool, std::collections::HashSet};

pub const REQUIRED_ORDER_COLUMNS: &[&str] = &[
    "id",
    "listing_id",
    "buyer_id",
    "seller_id",
    "amount_minor",
    "currency",
    "payment_intent_id",
    "status",
    "charge_id",
    "failure_reason",
    "created_at",
    "updated_at",
    "paid_at",
    "refunded_at",
];

/// Migration that introduced the newest required columns.
pub const SETTLEMENT_MIGRATION: &str = "0002_order_settlement_columns";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnCapabilities {
    columns: HashSet<String>,
}

impl ColumnCapabilities {
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|c| !self.has(c)).collect()
    }

    pub fn require(&self, required: &[&str]) -> Result<(), MarketError> {
        let missing = self.missing(required);
        if missing.is_empty() {
            return Ok(());
        }
        Err(MarketError::Store(format!(
            "orders table is missing columns [{}]; apply migration {SETTLEMENT_MIGRATION}",
            missing.join(", ")
        )))
    }
}

pub async fn probe_order_columns(pool: &PgPool) -> Result<ColumnCapabilities, MarketError> {
    let columns = sqlx::query_scalar::<_, String>(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = 'orders'
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ColumnCapabilities::from_columns(columns))
}

pub async fn require_current(pool: &PgPool) -> Result<(), MarketError> {
    let caps = probe_order_columns(pool).await?;
    caps.require(REQUIRED_ORDER_COLUMNS)?;
    tracing::info!(columns = REQUIRED_ORDER_COLUMNS.len(), "orders schema is current");
    Ok(())
}
