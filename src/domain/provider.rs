use {
    super::error::MarketError,
    super::id::{IntentRef, ListingId, OrderId, UserId},
    super::money::Money,
    std::{collections::HashMap, future::Future, pin::Pin},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the processor needs to open one intent for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub order_id: OrderId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub money: Money,
    pub description: String,
    pub idempotency_key: String,
}

impl IntentRequest {
    /// Round-trips through the processor and comes back on every event.
    pub fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("order_id".to_string(), self.order_id.to_string()),
            ("listing_id".to_string(), self.listing_id.to_string()),
            ("buyer_id".to_string(), self.buyer_id.to_string()),
        ])
    }
}

/// What the bridge gets back from the processor. Only `client_secret`
/// leaves the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIntent {
    pub intent_id: IntentRef,
    pub client_secret: String,
}

pub trait PaymentGateway: Send + Sync {
    fn create_intent(
        &self,
        request: &IntentRequest,
    ) -> BoxFuture<'_, Result<CreatedIntent, MarketError>>;

    fn cancel_intent(&self, intent_id: &IntentRef) -> BoxFuture<'_, Result<(), MarketError>>;
}
