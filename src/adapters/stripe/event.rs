use {
    crate::domain::{
        error::MarketError,
        id::EventId,
        payment_event::{
            ChargeSnapshot, IntentMetadata, IntentSnapshot, PaymentEventKind, VerifiedEvent,
        },
    },
    serde::Deserialize,
    stripe::WebhookError,
};

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

const HANDLED_TYPES: [&str; 3] = [PAYMENT_SUCCEEDED, PAYMENT_FAILED, CHARGE_REFUNDED];

/// Fallback read of a signed body the typed model rejected.
#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
}

/// Verifies `Stripe-Signature` and decodes the event.
///
/// A signed body of a handled type whose object does not decode comes back
/// as `PaymentEventKind::Malformed`; unhandled types as `Other`. Only a bad
/// signature or an unreadable envelope is an `Err`.
pub fn construct_event(
    body: &str,
    signature: &str,
    secret: &str,
) -> Result<VerifiedEvent, MarketError> {
    if secret.is_empty() {
        return Err(MarketError::WebhookSignature(
            "webhook secret not configured".into(),
        ));
    }

    match stripe::Webhook::construct_event(body, signature, secret) {
        Ok(event) => from_typed(body, event),
        // The signature checked out; only the typed decode failed.
        Err(WebhookError::BadParse(e)) => from_envelope(body, &e),
        Err(e) => Err(MarketError::WebhookSignature(e.to_string())),
    }
}

fn raw_json(body: &str) -> Result<serde_json::Value, MarketError> {
    serde_json::from_str(body)
        .map_err(|e| MarketError::Validation(format!("webhook body is not JSON: {e}")))
}

fn from_typed(body: &str, event: stripe::Event) -> Result<VerifiedEvent, MarketError> {
    let raw = raw_json(body)?;
    let event_type = raw
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let kind = match (event_type.as_str(), event.data.object) {
        (PAYMENT_SUCCEEDED, stripe::EventObject::PaymentIntent(pi)) => {
            PaymentEventKind::PaymentSucceeded(intent_snapshot(pi))
        }
        (PAYMENT_FAILED, stripe::EventObject::PaymentIntent(pi)) => {
            PaymentEventKind::PaymentFailed(intent_snapshot(pi))
        }
        (CHARGE_REFUNDED, stripe::EventObject::Charge(charge)) => {
            PaymentEventKind::ChargeRefunded(charge_snapshot(charge))
        }
        (t, _) if HANDLED_TYPES.contains(&t) => {
            PaymentEventKind::Malformed(format!("{t} carried an unexpected object"))
        }
        _ => PaymentEventKind::Other,
    };

    Ok(VerifiedEvent {
        id: EventId::new(event.id.to_string())?,
        event_type,
        kind,
        raw,
    })
}

fn from_envelope(body: &str, parse_error: &serde_json::Error) -> Result<VerifiedEvent, MarketError> {
    let raw = raw_json(body)?;
    let envelope: Envelope = serde_json::from_value(raw.clone())
        .map_err(|e| MarketError::Validation(format!("webhook envelope: {e}")))?;

    let kind = if HANDLED_TYPES.contains(&envelope.event_type.as_str()) {
        PaymentEventKind::Malformed(format!("{}: {parse_error}", envelope.event_type))
    } else {
        PaymentEventKind::Other
    };

    Ok(VerifiedEvent {
        id: EventId::new(envelope.id)?,
        event_type: envelope.event_type,
        kind,
        raw,
    })
}

fn intent_snapshot(pi: stripe::PaymentIntent) -> IntentSnapshot {
    let mut metadata = pi.metadata;
    IntentSnapshot {
        intent_id: pi.id.to_string(),
        amount_received: pi.amount_received,
        currency: pi.currency.to_string(),
        metadata: IntentMetadata {
            order_id: metadata.remove("order_id"),
            listing_id: metadata.remove("listing_id"),
            buyer_id: metadata.remove("buyer_id"),
        },
        latest_charge: pi.latest_charge.map(|charge| charge.id().to_string()),
        failure_message: pi.last_payment_error.and_then(|e| e.message),
    }
}

fn charge_snapshot(charge: stripe::Charge) -> ChargeSnapshot {
    ChargeSnapshot {
        charge_id: charge.id.to_string(),
        payment_intent: charge.payment_intent.map(|pi| pi.id().to_string()),
        amount_refunded: charge.amount_refunded,
        currency: charge.currency.to_string(),
    }
}
