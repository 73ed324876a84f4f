use {
    super::to_stripe_currency,
    crate::domain::{
        error::MarketError,
        id::IntentRef,
        provider::{BoxFuture, CreatedIntent, IntentRequest, PaymentGateway},
    },
    serde::Serialize,
};

pub struct StripeGateway {
    client: stripe::Client,
}

impl StripeGateway {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }
}

impl PaymentGateway for StripeGateway {
    fn create_intent(
        &self,
        request: &IntentRequest,
    ) -> BoxFuture<'_, Result<CreatedIntent, MarketError>> {
        let request = request.clone();
        Box::pin(async move { self.create_intent_inner(&request).await })
    }

    fn cancel_intent(&self, intent_id: &IntentRef) -> BoxFuture<'_, Result<(), MarketError>> {
        let intent_id = intent_id.clone();
        Box::pin(async move { self.cancel_intent_inner(&intent_id).await })
    }
}

#[derive(Serialize)]
struct CancelForm {
    cancellation_reason: &'static str,
}

impl StripeGateway {
    async fn create_intent_inner(
        &self,
        request: &IntentRequest,
    ) -> Result<CreatedIntent, MarketError> {
        // Same key on every retry, so the processor never opens two intents
        // for one order.
        let client = self
            .client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(
                request.idempotency_key.clone(),
            ));

        let mut params = stripe::CreatePaymentIntent::new(
            request.money.amount().minor_units(),
            to_stripe_currency(request.money.currency()),
        );
        params.description = Some(request.description.as_str());
        params.metadata = Some(request.metadata());

        let pi = stripe::PaymentIntent::create(&client, params)
            .await
            .map_err(|e| MarketError::ExternalService(format!("Stripe API: {e}")))?;

        let client_secret = pi.client_secret.clone().ok_or_else(|| {
            MarketError::ExternalService(format!("intent {} has no client secret", pi.id))
        })?;

        Ok(CreatedIntent {
            intent_id: IntentRef::new(pi.id.to_string())?,
            client_secret,
        })
    }

    async fn cancel_intent_inner(&self, intent_id: &IntentRef) -> Result<(), MarketError> {
        if intent_id.is_placeholder() {
            return Ok(());
        }
        self.client
            .post_form::<stripe::PaymentIntent, _>(
                &format!("/payment_intents/{}/cancel", intent_id.as_str()),
                CancelForm {
                    cancellation_reason: "abandoned",
                },
            )
            .await
            .map_err(|e| MarketError::ExternalService(format!("Stripe API: {e}")))?;
        Ok(())
    }
}
