use {
    crate::domain::{
        error::BillingError,
        event::{EventEnvelope, SubscriptionPayload},
        id::{EventId, SubscriptionId},
        provider::{BillingProvider, ProviderSubscription},
    },
    std::{future::Future, pin::Pin},
};

/// Live provider backed by the Stripe API. Read-only by construction:
/// the engine never mutates provider state, it only re-reads it.
pub struct StripeProvider {
    client: stripe::Client,
}

impl StripeProvider {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }
}

impl BillingProvider for StripeProvider {
    fn fetch_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderSubscription, BillingError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move { self.fetch_subscription_inner(&id).await })
    }

    fn fetch_event(
        &self,
        id: &EventId,
    ) -> Pin<Box<dyn Future<Output = Result<EventEnvelope, BillingError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move { self.fetch_event_inner(&id).await })
    }
}

impl StripeProvider {
    async fn fetch_subscription_inner(
        &self,
        id: &SubscriptionId,
    ) -> Result<ProviderSubscription, BillingError> {
        let sub_id = id
            .as_str()
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| BillingError::Provider(format!("invalid subscription id: {e}")))?;
        let sub = stripe::Subscription::retrieve(&self.client, &sub_id, &[])
            .await
            .map_err(|e| BillingError::Provider(format!("Stripe API: {e}")))?;

        // Round-trip through the wire shape so API reads and webhook
        // payloads share one conversion path.
        let payload: SubscriptionPayload = serde_json::from_value(serde_json::to_value(&sub)?)
            .map_err(|e| BillingError::Provider(format!("unexpected subscription shape: {e}")))?;
        ProviderSubscription::from_payload(&payload)
    }

    async fn fetch_event_inner(&self, id: &EventId) -> Result<EventEnvelope, BillingError> {
        let event_id = id
            .as_str()
            .parse::<stripe::EventId>()
            .map_err(|e| BillingError::Provider(format!("invalid event id: {e}")))?;
        let event = stripe::Event::retrieve(&self.client, &event_id, &[])
            .await
            .map_err(|e| BillingError::Provider(format!("Stripe API: {e}")))?;

        EventEnvelope::parse(&serde_json::to_vec(&event)?)
    }
}
