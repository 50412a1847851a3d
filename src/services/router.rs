use {
    crate::domain::error::BillingError,
    crate::domain::event::{EventCategory, EventEnvelope},
    crate::domain::provider::BillingProvider,
    crate::services::pipeline::Outcome,
    crate::services::{customer_processor, payment_processor, subscription_processor},
    sqlx::PgPool,
};

/// Dispatch one claimed event to its processor by routing family. The
/// match is exhaustive over `EventCategory`, so a new category cannot be
/// added without deciding its routing here.
pub async fn route(
    pool: &PgPool,
    provider: &dyn BillingProvider,
    envelope: &EventEnvelope,
) -> Result<Outcome, BillingError> {
    match envelope.kind.category() {
        EventCategory::Subscription => {
            subscription_processor::process(pool, provider, envelope).await
        }
        EventCategory::Checkout => subscription_processor::process_checkout(pool, envelope).await,
        EventCategory::Payment => payment_processor::process(pool, envelope).await,
        EventCategory::Customer => customer_processor::process(pool, envelope).await,
        EventCategory::PaymentMethod => {
            customer_processor::process_payment_method(pool, envelope).await
        }
        EventCategory::Catalog => {
            // Product/price sync is the catalog service's job; we only
            // acknowledge so the provider stops resending.
            tracing::info!(event_type = envelope.kind.as_str(), "catalog event acknowledged");
            Ok(Outcome::Ignored)
        }
        EventCategory::Unknown => {
            tracing::info!(event_type = envelope.kind.as_str(), "unhandled event type");
            Ok(Outcome::Ignored)
        }
    }
}
