use {
    super::error::MarketError,
    super::id::{EventId, OrderId},
    super::order::OrderStatus,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Processing state of a payment event in the idempotency ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Received,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for EventStatus {
    type Error = MarketError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "received" => Ok(Self::Received),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(MarketError::Validation(format!(
                "unknown event status: {other}"
            ))),
        }
    }
}

/// For INSERT into the ledger.
#[derive(Debug, Clone)]
pub struct NewPaymentEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEventRecord {
    pub event_id: EventId,
    pub event_type: String,
    pub status: EventStatus,
    pub error: Option<String>,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Result of trying to record an event as `received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClaim {
    /// First delivery, or a retry of a delivery previously marked `failed`.
    Claimed,
    /// Already `received` or `processed`; side effects must not run again.
    AlreadyHandled,
}

/// Metadata stamped on every payment intent at creation. The only trusted
/// join key from processor events back to orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentMetadata {
    pub order_id: Option<String>,
    pub listing_id: Option<String>,
    pub buyer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentSnapshot {
    pub intent_id: String,
    pub amount_received: i64,
    /// Lowercase ISO code, as the processor sends it.
    pub currency: String,
    pub metadata: IntentMetadata,
    pub latest_charge: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeSnapshot {
    pub charge_id: String,
    pub payment_intent: Option<String>,
    pub amount_refunded: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    PaymentSucceeded(IntentSnapshot),
    PaymentFailed(IntentSnapshot),
    ChargeRefunded(ChargeSnapshot),
    /// Signed and of a handled type, but the object could not be read.
    Malformed(String),
    Other,
}

/// An event whose signature has been checked.
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    pub id: EventId,
    pub event_type: String,
    pub kind: PaymentEventKind,
    pub raw: serde_json::Value,
}

/// Why an event was acknowledged without changing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingOrderReference,
    OrderNotFound,
    IntentMismatch { stored: String, received: String },
    CurrencyMismatch { stored: String, received: String },
    NotPending(OrderStatus),
    NotPaid(OrderStatus),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event id already in the ledger.
    Duplicate,
    Paid(OrderId),
    AlreadyPaid(OrderId),
    MarkedFailed(OrderId),
    Refunded(OrderId),
    Skipped {
        order_id: Option<OrderId>,
        reason: SkipReason,
    },
    /// Event type this service does not act on.
    Unhandled,
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Paid(_) => "paid",
            Self::AlreadyPaid(_) => "already_paid",
            Self::MarkedFailed(_) => "failed",
            Self::Refunded(_) => "refunded",
            Self::Skipped { .. } => "skipped",
            Self::Unhandled => "unhandled",
        }
    }
}
