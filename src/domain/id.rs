use {
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::str::FromStr,
    uuid::Uuid,
};

use super::error::MarketError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = MarketError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| {
                    MarketError::Validation(format!(
                        "{} must be a uuid, got: {s}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

uuid_id!(
    /// Server-generated order identifier.
    OrderId
);
uuid_id!(ListingId);
uuid_id!(UserId);
uuid_id!(DeliverableId);

const PLACEHOLDER_PREFIX: &str = "pending_";

/// Payment-intent identifier stored on an order (`pi_xxx`), or the local
/// `pending_<uuid>` placeholder written before the processor has answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentRef(String);

impl IntentRef {
    pub fn new(id: impl Into<String>) -> Result<Self, MarketError> {
        let id = id.into();
        if !(id.starts_with("pi_") || id.starts_with(PLACEHOLDER_PREFIX)) {
            return Err(MarketError::Validation(format!(
                "IntentRef must start with pi_ or {PLACEHOLDER_PREFIX}, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Unique stand-in satisfying the `payment_intent_id` uniqueness
    /// constraint until the real intent id is known.
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::now_v7()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Stripe event identifier (`evt_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, MarketError> {
        let id = id.into();
        if !id.starts_with("evt_") {
            return Err(MarketError::Validation(format!(
                "EventId must start with evt_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}
